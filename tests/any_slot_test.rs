use std::{cell::RefCell, rc::Rc};

use dual_render::data_structures::any::{AnySlot, SlotError};

#[derive(Debug, Clone, PartialEq)]
struct Handle {
    id: u32,
    label: String,
}

#[test]
fn stores_and_returns_the_same_value() {
    let slot = AnySlot::from_value(Handle {
        id: 7,
        label: "pipeline".to_string(),
    });
    assert!(!slot.is_empty());
    assert!(slot.holds::<Handle>());
    assert_eq!(slot.get::<Handle>().unwrap().id, 7);
    assert!(slot.type_name().unwrap().ends_with("Handle"));
}

#[test]
fn wrong_type_is_a_mismatch() {
    let slot = AnySlot::from_value(42u32);
    let err = slot.get::<u64>().unwrap_err();
    assert_eq!(
        err,
        SlotError::TypeMismatch {
            expected: "u64",
            found: Some("u32"),
        }
    );
    assert!(err.to_string().contains("u64"));
    // no implicit conversion between integer widths either
    assert!(slot.get::<i32>().is_err());
}

#[test]
fn empty_slot_reports_nothing_found() {
    let mut slot = AnySlot::new();
    assert!(slot.is_empty());
    assert_eq!(slot.type_name(), None);
    match slot.get::<String>() {
        Err(SlotError::TypeMismatch { found, .. }) => assert_eq!(found, None),
        other => panic!("expected a mismatch, got {other:?}"),
    }
    assert!(slot.take::<String>().is_err());
}

#[test]
fn failed_take_leaves_the_value_in_place() {
    let mut slot = AnySlot::from_value(String::from("kept"));
    assert!(slot.take::<u8>().is_err());
    assert_eq!(slot.take::<String>().unwrap(), "kept");
    assert!(slot.is_empty());
}

#[test]
fn clone_is_deep() {
    let mut original = AnySlot::from_value(vec![1, 2, 3]);
    let copy = original.clone();
    original.get_mut::<Vec<i32>>().unwrap().push(4);

    assert_eq!(original.get::<Vec<i32>>().unwrap(), &vec![1, 2, 3, 4]);
    assert_eq!(copy.get::<Vec<i32>>().unwrap(), &vec![1, 2, 3]);
}

#[test]
fn moving_out_empties_the_source() {
    let mut source = AnySlot::from_value(5i64);
    let moved = source.take_slot();
    assert!(source.is_empty());
    assert_eq!(moved.get::<i64>(), Ok(&5));

    let mut again = moved;
    let taken = std::mem::take(&mut again);
    assert!(again.is_empty());
    assert_eq!(taken.get::<i64>(), Ok(&5));
}

#[test]
fn swap_exchanges_values() {
    let mut a = AnySlot::from_value(1u8);
    let mut b = AnySlot::from_value("two");
    a.swap(&mut b);
    assert_eq!(a.get::<&str>(), Ok(&"two"));
    assert_eq!(b.get::<u8>(), Ok(&1));
}

/// Counts live copies through a shared counter.
#[derive(Debug)]
struct Tracked(Rc<RefCell<i32>>);

impl Clone for Tracked {
    fn clone(&self) -> Self {
        *self.0.borrow_mut() += 1;
        Tracked(self.0.clone())
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        *self.0.borrow_mut() -= 1;
    }
}

fn tracked(counter: &Rc<RefCell<i32>>) -> Tracked {
    *counter.borrow_mut() += 1;
    Tracked(counter.clone())
}

#[test]
fn assignment_drops_the_previous_value() {
    let live = Rc::new(RefCell::new(0));
    let mut slot = AnySlot::from_value(tracked(&live));
    assert_eq!(*live.borrow(), 1);

    slot.set(tracked(&live));
    assert_eq!(*live.borrow(), 1);

    slot.set(3.5f32);
    assert_eq!(*live.borrow(), 0);
    assert_eq!(slot.get::<f32>(), Ok(&3.5));
}

#[test]
fn clear_and_drop_release_the_value() {
    let live = Rc::new(RefCell::new(0));
    let mut slot = AnySlot::from_value(tracked(&live));
    let copy = slot.clone();
    assert_eq!(*live.borrow(), 2);

    slot.clear();
    assert_eq!(*live.borrow(), 1);
    drop(copy);
    assert_eq!(*live.borrow(), 0);
}
