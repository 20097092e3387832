use std::rc::Rc;

use dual_render::{
    RenderError, RendererConfig,
    data_structures::any::AnySlot,
    vulkan::{VulkanObjectData, ensure_capacity, last_owner},
};

#[test]
fn cloned_slot_shares_the_bundle_and_only_the_last_owner_destroys_it() {
    let mut slot = AnySlot::from_value(Rc::new(VulkanObjectData::default()));
    let mut copy = slot.clone();

    let first = slot.take::<Rc<VulkanObjectData>>().unwrap();
    let second = copy.get::<Rc<VulkanObjectData>>().unwrap();
    assert!(Rc::ptr_eq(&first, second));

    // the copy still holds it, so the first release must leave the handles alone
    assert!(last_owner(first).is_none());
    assert!(slot.is_empty());

    let second = copy.take::<Rc<VulkanObjectData>>().unwrap();
    assert!(last_owner(second).is_some());
}

#[test]
fn zero_max_objects_still_admits_one_object() {
    let config = RendererConfig {
        max_objects: 0,
        ..Default::default()
    };
    assert_eq!(config.object_capacity(), 1);
    ensure_capacity(1, config.object_capacity()).unwrap();

    let err = ensure_capacity(2, config.object_capacity()).unwrap_err();
    assert!(matches!(
        err,
        RenderError::ResourceCreation {
            resource: "descriptor set",
            ..
        }
    ));
}

#[test]
fn capacity_follows_max_objects() {
    let config = RendererConfig::default();
    assert_eq!(config.object_capacity(), config.max_objects);
    ensure_capacity(config.max_objects as usize, config.object_capacity()).unwrap();
    assert!(ensure_capacity(config.max_objects as usize + 1, config.object_capacity()).is_err());
}
