use refract_spirv::*;

#[path = "../src/testing.rs"]
mod testing;

#[test]
fn double_destroy() {
    let mut handle = ModuleHandle::parse(testing::minimal_module()).unwrap();
    assert_eq!(handle.state(), HandleState::Parsed);
    assert_eq!(handle.module().entry_point_name(), Some("main"));

    handle.destroy().unwrap();
    assert_eq!(handle.state(), HandleState::Destroyed);
    let err = handle.destroy().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DoubleDestroy);
    assert_eq!(err.to_string(), "module handle destroyed twice");
}

#[test]
fn destroy_before_load() {
    let mut handle = ModuleHandle::new();
    handle.destroy().unwrap();
    assert_eq!(handle.try_module().unwrap_err().kind(), ErrorKind::UseAfterDestroy);
}

#[test]
fn parse_failure_reports_context() {
    let mut bytes = testing::minimal_module();
    bytes.truncate(bytes.len() - 4);
    let err = ModuleHandle::parse(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInstruction);
    match err.context() {
        Some(Context::Offset(offset)) => assert!(offset >= 5),
        other => panic!("unexpected context: {:?}", other),
    }
}

#[test]
fn independent_parses_across_threads() {
    let bytes = testing::minimal_module();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bytes = bytes.clone();
            std::thread::spawn(move || parse_bytes(bytes).map(|m| m.shader_stage()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), ShaderStage::FRAGMENT);
    }
}
