use std::{cell::RefCell, rc::Rc};

use dual_render::vulkan::teardown::TeardownStack;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn push(stack: &mut TeardownStack, log: &Log, label: &'static str) {
    let log = log.clone();
    stack.push(label, move || log.borrow_mut().push(label));
}

#[test]
fn unwinds_in_reverse_creation_order() {
    let log = Log::default();
    let mut stack = TeardownStack::new();
    for label in ["instance", "surface", "device", "swapchain", "semaphores"] {
        push(&mut stack, &log, label);
    }
    assert_eq!(stack.len(), 5);
    assert_eq!(stack.labels()[0], "instance");

    stack.unwind();
    assert!(stack.is_empty());
    assert_eq!(
        *log.borrow(),
        ["semaphores", "swapchain", "device", "surface", "instance"]
    );

    // nothing runs twice
    stack.unwind();
    assert_eq!(log.borrow().len(), 5);
}

#[test]
fn drop_unwinds() {
    let log = Log::default();
    {
        let mut stack = TeardownStack::new();
        push(&mut stack, &log, "command pool");
        push(&mut stack, &log, "descriptor pool");
        assert_eq!(format!("{stack:?}"), r#"["command pool", "descriptor pool"]"#);
    }
    assert_eq!(*log.borrow(), ["descriptor pool", "command pool"]);
}

fn build(log: &Log, fail_after: usize) -> Result<TeardownStack, String> {
    let mut stack = TeardownStack::new();
    for (step, label) in ["instance", "surface", "device", "swapchain"].into_iter().enumerate() {
        if step == fail_after {
            return Err(format!("creating {label} failed"));
        }
        push(&mut stack, log, label);
    }
    Ok(stack)
}

#[test]
fn partial_construction_destroys_only_what_exists() {
    let log = Log::default();
    let err = build(&log, 2).unwrap_err();
    assert_eq!(err, "creating device failed");
    assert_eq!(*log.borrow(), ["surface", "instance"]);
}

#[test]
fn complete_construction_destroys_nothing_early() {
    let log = Log::default();
    let stack = build(&log, usize::MAX).unwrap();
    assert!(log.borrow().is_empty());
    drop(stack);
    assert_eq!(*log.borrow(), ["swapchain", "device", "surface", "instance"]);
}
