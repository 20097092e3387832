#![cfg(feature = "integration-tests")]

use dual_render::{
    Backend,
    flow::{self, RunOptions},
};

use crate::common::test_utils::quad_scene;
mod common;

#[test]
fn presents_exactly_one_frame() {
    flow::init_logging();
    let mut options = RunOptions::new(Backend::Immediate);
    options.frame_limit = Some(1);

    let summary = flow::run(options, |backend, _| Ok(quad_scene(backend))).unwrap();
    assert_eq!(summary.backend, Backend::Immediate);
    assert_eq!(summary.frames_presented, 1);
}
