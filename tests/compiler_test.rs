use taskflow::compiler::core::Compiler;
use taskflow::dsl::builder::ProcessBuilder;
use taskflow::dsl::{CreationMode, SynchronizationMode};
use taskflow::variables::Usage;

fn review(builder: ProcessBuilder, id: &str) -> ProcessBuilder {
    builder
        .multi_task(id, "Review")
            .creation_mode(CreationMode::ByExecutors)
            .synchronization(SynchronizationMode::First)
            .discriminator("reviewers", &[Usage::Read])
            .build()
}

#[test]
fn test_compile_linear_process() {
    // 1. Build DSL
    let process = review(ProcessBuilder::new("linear-compile-test").start("start"), "review")
        .end("end")
        .connect("start", "review")
        .connect("review", "end")
        .build();

    // 2. Compile
    let mut compiler = Compiler::new();
    let blueprint = compiler.compile(process).expect("Compilation failed");

    // 3. Assert Blueprint Structure
    assert_eq!(blueprint.id, "linear-compile-test");
    assert_eq!(blueprint.nodes.len(), 3);

    let start_node = &blueprint.nodes[blueprint.start_index];
    assert_eq!(start_node.kind, "start");
    assert_eq!(start_node.params.get("next").and_then(|v| v.as_u64()), Some(1));

    // Multi-task params carry the spec plus the resolved jump target
    let review_node = &blueprint.nodes[1];
    assert_eq!(review_node.kind, "multi_task");
    assert_eq!(review_node.params.get("next").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(review_node.params["synchronization_mode"], "FIRST");
    assert_eq!(review_node.params["task"]["name"], "Review");

    let end_node = &blueprint.nodes[2];
    assert_eq!(end_node.kind, "end");
}

#[test]
fn test_compile_leaves_next_empty_without_edge() {
    let process = review(ProcessBuilder::new("dangling").start("start"), "review")
        .connect("start", "review")
        .build();

    let blueprint = Compiler::new().compile(process).expect("Compilation failed");
    assert!(blueprint.nodes[1].params["next"].is_null());
}

#[test]
fn test_compile_rejects_invalid_graphs() {
    let duplicate = review(review(ProcessBuilder::new("dup").start("start"), "review"), "review")
        .connect("start", "review")
        .build();
    assert!(Compiler::new().compile(duplicate).is_err());

    let unknown_target = ProcessBuilder::new("unknown").start("start").connect("start", "nowhere").build();
    assert!(Compiler::new().compile(unknown_target).is_err());

    let fan_out_edges = review(review(ProcessBuilder::new("fork").start("start"), "a"), "b")
        .connect("start", "a")
        .connect("start", "b")
        .build();
    assert!(Compiler::new().compile(fan_out_edges).is_err());

    let no_start = review(ProcessBuilder::new("headless"), "review").build();
    assert!(Compiler::new().compile(no_start).is_err());
}
