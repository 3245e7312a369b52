use lockfree_list::{List, DEFAULT_CHUNK_SIZE};

fn main() {
    let list = List::new(DEFAULT_CHUNK_SIZE).unwrap();
    list.emplace(10).unwrap();
    list.emplace(21).unwrap();
    list.emplace(42).unwrap();

    // Looking at a popped value without consuming it leaves it in the list.
    if let Some(value) = list.pop().get() {
        println!("peeked {}", value);
    }

    for value in list.begin() {
        println!("{}", value);
    }
    assert!(list.begin() == list.end());
}
