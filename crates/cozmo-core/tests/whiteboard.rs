use std::collections::BTreeSet;

use cozmo_core::{ObjectId, WbKey, Whiteboard};

const FAILED: WbKey<BTreeSet<ObjectId>> = WbKey::new(1, "failed_objects");
const COUNT: WbKey<u32> = WbKey::new(2, "count");

#[test]
fn whiteboard_set_get_remove_roundtrip() {
    let mut wb = Whiteboard::new();
    assert!(!wb.contains(COUNT));

    wb.set(COUNT, 3);
    wb.get_or_insert_with(FAILED, BTreeSet::new)
        .insert(ObjectId(4));

    assert_eq!(wb.get(COUNT).copied(), Some(3));
    assert!(wb.get(FAILED).is_some_and(|s| s.contains(&ObjectId(4))));
    assert_eq!(wb.len(), 2);

    if let Some(count) = wb.get_mut(COUNT) {
        *count += 1;
    }
    assert_eq!(wb.remove(COUNT), Some(4));
    assert_eq!(wb.get(COUNT), None);
}

#[test]
#[should_panic(expected = "holds a different type")]
fn whiteboard_type_mismatch_panics() {
    let mut wb = Whiteboard::new();
    wb.set(WbKey::<u32>::new(9, "n"), 1u32);
    let _ = wb.get(WbKey::<i64>::new(9, "n"));
}
