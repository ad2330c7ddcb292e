//! Scope stack behaviour driven directly through the builder.

use bumpalo::Bump;
use scopeflow::core::{CompilationSession, DiagnosticSink, IrBuilder, Loc};
use scopeflow::ir::{Block, FunctionBuilder, Inst, Slot, Terminator};
use scopeflow::scope::{CleanupCursor, LabelId, ScopeStack, StmtId};
use scopeflow::ScopeError;

type Stack = ScopeStack<Block, Slot>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Push a single-block cleanup scope.
fn push_finally(fb: &mut FunctionBuilder<'_, '_>, stack: &mut Stack) -> Block {
    let body = fb.create_block("try.finally");
    stack.push_cleanup(body, body);
    body
}

#[test]
fn test_goto_out_of_two_scopes_gets_one_edge_per_scope() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    let outer = push_finally(&mut fb, &mut stack);
    let inner = push_finally(&mut fb, &mut stack);
    let src = fb.create_block("src");
    fb.set_current_block(src);
    stack.jump_to_label(&mut fb, Loc::new(3, 5), LabelId(0)).unwrap();
    let placeholder = stack.current_unresolved_gotos()[0].tentative_target;

    stack.pop_cleanups(&mut fb, CleanupCursor(1)).unwrap();
    assert_eq!(stack.scopes()[0].unresolved_gotos.len(), 1);
    stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();
    assert_eq!(stack.top_level_unresolved_gotos().len(), 1);

    let label = fb.create_block("done");
    stack.add_label_target(&mut fb, LabelId(0), label).unwrap();

    let func = fb.function();
    assert_eq!(func.terminator(src), Some(&Terminator::Br { target: inner }));
    assert_eq!(func.terminator(inner), Some(&Terminator::Br { target: outer }));
    assert_eq!(func.terminator(outer), Some(&Terminator::Br { target: label }));
    assert!(func.block(placeholder).erased);
    assert_eq!(func.predecessors(label), vec![outer]);
    assert_eq!(func.slot_count(), 0);

    let mut sink = DiagnosticSink::new();
    stack.finish(&mut sink).unwrap();
    assert_eq!(sink.error_count(), 0);
    assert!(!sink.is_fatal());
}

#[test]
fn test_goto_crossing_scopes_with_other_exits_gets_selector_cases() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    let outer = push_finally(&mut fb, &mut stack);
    let inner = push_finally(&mut fb, &mut stack);

    // A regular exit through both scopes first.
    let first = fb.create_block("first");
    let other = fb.create_block("other");
    fb.set_current_block(first);
    stack.run_all_cleanups(&mut fb, other).unwrap();

    let src = fb.create_block("src");
    fb.set_current_block(src);
    stack.jump_to_label(&mut fb, Loc::new(7, 1), LabelId(0)).unwrap();
    stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();

    let label = fb.create_block("done");
    stack.add_label_target(&mut fb, LabelId(0), label).unwrap();

    let func = fb.function();
    // Inner scope: the regular exit continues in the outer body, and so does
    // the goto, each through its own case.
    match func.terminator(inner) {
        Some(Terminator::Switch { default, cases, .. }) => {
            assert_eq!(*default, outer);
            assert_eq!(cases, &vec![(1, outer)]);
        }
        other => panic!("expected switch in inner scope, got {:?}", other),
    }
    match func.terminator(outer) {
        Some(Terminator::Switch { default, cases, .. }) => {
            assert_eq!(*default, other);
            assert_eq!(cases, &vec![(1, label)]);
        }
        other => panic!("expected switch in outer scope, got {:?}", other),
    }

    let stored: Vec<u32> = func
        .insts(src)
        .iter()
        .filter_map(|inst| match inst {
            Inst::Store { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(stored, vec![1, 1]);
    assert_eq!(func.slot_count(), 2);
    assert_eq!(session.stats().placeholders_erased, 1);
}

#[test]
fn test_three_single_target_scopes_never_allocate_a_selector() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    for _ in 0..3 {
        let body = push_finally(&mut fb, &mut stack);
        let start = fb.create_block("try");
        let after = fb.create_block("try.success");
        fb.set_current_block(start);
        let depth = CleanupCursor(stack.current_cleanup_scope().0 - 1);
        stack.run_cleanups(&mut fb, depth, after).unwrap();
        stack.pop_cleanups(&mut fb, depth).unwrap();
        assert_eq!(fb.function().terminator(body), Some(&Terminator::Br { target: after }));
        fb.set_current_block(after);
    }

    assert_eq!(fb.function().slot_count(), 0);
    assert_eq!(session.stats().selectors_allocated, 0);
    assert_eq!(session.stats().selector_stores, 0);
}

#[test]
fn test_two_breaks_through_one_finally() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    let outer_end = fb.create_block("outer.end");
    let outer_head = fb.create_block("outer.head");
    stack.push_loop_target(StmtId(0), outer_head, outer_end);
    let inner_end = fb.create_block("inner.end");
    let inner_head = fb.create_block("inner.head");
    stack.push_loop_target(StmtId(1), inner_head, inner_end);
    let body = push_finally(&mut fb, &mut stack);

    let a = fb.create_block("a");
    fb.set_current_block(a);
    stack.break_to_statement(&mut fb, StmtId(1)).unwrap();
    let b = fb.create_block("b");
    fb.set_current_block(b);
    stack.break_to_statement(&mut fb, StmtId(0)).unwrap();

    let slot = stack.scopes()[0].exits.selector().unwrap();
    let func = fb.function();
    assert_eq!(func.slot_name(slot), "branchsel.try.finally");
    match func.terminator(body) {
        Some(Terminator::Switch { default, cases, .. }) => {
            assert_eq!(*default, inner_end);
            assert_eq!(cases, &vec![(1, outer_end)]);
        }
        other => panic!("expected switch, got {:?}", other),
    }
    assert_eq!(func.insts(a), &[Inst::Store { slot, value: 0 }]);
    assert_eq!(func.insts(b), &[Inst::Store { slot, value: 1 }]);

    stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();
    stack.pop_loop_target();
    stack.pop_loop_target();
}

#[test]
fn test_every_undefined_goto_is_reported_once() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    stack.jump_to_label(&mut fb, Loc::new(1, 1), LabelId(0)).unwrap();
    push_finally(&mut fb, &mut stack);
    let inside = fb.create_block("inside");
    fb.set_current_block(inside);
    stack.jump_to_label(&mut fb, Loc::new(2, 1), LabelId(1)).unwrap();
    stack.pop_cleanups(&mut fb, CleanupCursor::TOP).unwrap();

    let mut sink = DiagnosticSink::new();
    assert_eq!(
        stack.finish(&mut sink),
        Err(ScopeError::UnresolvedGotos { count: 2 })
    );
    let locs: Vec<Loc> = sink.diagnostics().iter().map(|d| d.loc).collect();
    assert_eq!(locs, vec![Loc::new(1, 1), Loc::new(2, 1)]);
    assert!(sink
        .diagnostics()
        .iter()
        .all(|d| d.message == "goto to undefined label"));
    assert!(sink.is_fatal());
}

#[test]
fn test_label_in_enclosing_scope_resolves_goto_after_inner_pop() {
    init();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut fb = FunctionBuilder::new(&session, "f");
    let mut stack = Stack::new();

    let outer = push_finally(&mut fb, &mut stack);
    let inner = push_finally(&mut fb, &mut stack);
    let src = fb.create_block("src");
    fb.set_current_block(src);
    stack.jump_to_label(&mut fb, Loc::new(4, 2), LabelId(0)).unwrap();
    stack.pop_cleanups(&mut fb, CleanupCursor(1)).unwrap();

    // Label inside the still open outer scope.
    let label = fb.create_block("inner.done");
    stack.add_label_target(&mut fb, LabelId(0), label).unwrap();
    assert!(stack.current_unresolved_gotos().is_empty());

    let func = fb.function();
    assert_eq!(func.terminator(src), Some(&Terminator::Br { target: inner }));
    assert_eq!(func.terminator(inner), Some(&Terminator::Br { target: label }));
    assert!(func.terminator(outer).is_none());
    assert_eq!(
        stack.label_target(LabelId(0)).map(|t| t.cleanup_scope),
        Some(CleanupCursor(1))
    );
}
