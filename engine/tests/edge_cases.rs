//! Edge case tests for canopy-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use canopy_engine::{Action, Error, ItemId, ItemRecord, Plan, Planner, Role, Violation};
use chrono::{TimeZone, Utc};

fn id(raw: &str) -> ItemId {
    ItemId::remote(raw)
}

/// root ⊃ A ⊃ B ⊃ C, file F in A, file G in C, multi-parented M in A and B.
fn create_test_planner() -> Planner {
    let modified = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    Planner::from_records(
        "root",
        [
            ItemRecord::folder("root", "Root", vec![]),
            ItemRecord::folder("A", "A", vec![id("root")]).with_modified_time(modified),
            ItemRecord::folder("B", "B", vec![id("A")]).with_modified_time(modified),
            ItemRecord::folder("C", "C", vec![id("B")]).with_modified_time(modified),
            ItemRecord::new("F", "f.txt", "text/plain", vec![id("A")]).with_modified_time(modified),
            ItemRecord::new("G", "g.txt", "text/plain", vec![id("C")]).with_modified_time(modified),
            ItemRecord::new("M", "m.txt", "text/plain", vec![id("A"), id("B")]),
        ],
    )
    .unwrap()
}

fn apply_order_seqs(plan: &Plan) -> Vec<u64> {
    plan.apply_order
        .iter()
        .map(|op_id| plan.operation(op_id).unwrap().seq)
        .collect()
}

// ============================================================================
// Name Edge Cases
// ============================================================================

#[test]
fn unicode_names() {
    let mut planner = create_test_planner();

    let names = [
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "a/b\\c",
    ];

    for name in names {
        let folder = planner.create_folder(name, &id("root")).unwrap();
        assert_eq!(planner.get(&folder).unwrap().name, name);
        assert_eq!(planner.find_by_name(name, Some(&id("root"))).unwrap().len(), 1);
    }
    assert!(planner.snapshot().check_consistency().is_ok());
}

#[test]
fn blank_names_are_rejected() {
    let mut planner = create_test_planner();
    for name in ["", "   ", "\t\n"] {
        assert!(matches!(
            planner.create_folder(name, &id("root")),
            Err(Error::MissingField { field: "name", .. })
        ));
    }
    assert_eq!(planner.pending_count(), 0);
}

#[test]
fn duplicate_names_are_allowed() {
    let mut planner = create_test_planner();
    let first = planner.create_folder("Same", &id("root")).unwrap();
    let second = planner.create_folder("Same", &id("root")).unwrap();
    assert_ne!(first, second);

    let found = planner.find_by_name("Same", None).unwrap();
    assert_eq!(found.len(), 2);
    let children = planner.list_children(&id("root")).unwrap();
    assert_eq!(children.iter().filter(|r| r.name == "Same").count(), 2);
}

// ============================================================================
// Structural Laws
// ============================================================================

#[test]
fn cycle_law() {
    let mut planner = create_test_planner();
    let before = planner.snapshot().clone();

    let err = planner.move_item(&id("A"), &id("C")).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::MoveCycle));
    let err = planner.move_item(&id("A"), &id("A")).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::MoveCycle));

    assert_eq!(planner.snapshot(), &before);
    assert!(planner.list_ops().is_empty());

    // Moving a folder down into a sibling subtree is fine.
    planner.move_item(&id("C"), &id("A")).unwrap();
    assert_eq!(planner.get(&id("C")).unwrap().parents, vec![id("A")]);
}

#[test]
fn cycle_through_pending_folder() {
    let mut planner = create_test_planner();
    let inner = planner.create_folder("Inner", &id("C")).unwrap();
    let err = planner.move_item(&id("A"), &inner).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::MoveCycle));
}

#[test]
fn tombstone_law() {
    let mut planner = create_test_planner();
    planner.trash(&id("C")).unwrap();

    let err = planner.rename(&id("C"), "x").unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Tombstoned(Role::Target)));
    let err = planner.create_folder("x", &id("C")).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Tombstoned(Role::Parent)));
    let err = planner
        .upload_file("/tmp/x.bin", &id("C"), None)
        .unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Tombstoned(Role::Parent)));
    let err = planner.copy(&id("F"), &id("C"), None).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Tombstoned(Role::NewParent)));

    // Descendants of a tombstoned folder are not tombstoned themselves.
    planner.rename(&id("G"), "still-allowed.txt").unwrap();
    assert_eq!(planner.pending_count(), 2);
}

#[test]
fn root_is_protected() {
    let mut planner = create_test_planner();
    for (action, result) in [
        (Action::Rename, planner.clone().rename(&id("root"), "x")),
        (Action::Move, planner.clone().move_item(&id("root"), &id("A"))),
        (Action::Trash, planner.clone().trash(&id("root"))),
        (
            Action::DeletePermanent,
            planner.clone().delete_permanently(&id("root")),
        ),
    ] {
        let err = result.unwrap_err();
        assert_eq!(err.violation(), Some(&Violation::RootProtected(action)));
    }
    // Reads of root-level items stay allowed.
    planner.download_file(&id("F"), "/tmp/f.txt", false).unwrap();
}

#[test]
fn multi_parent_items_cannot_move_but_can_be_renamed() {
    let mut planner = create_test_planner();
    let err = planner.move_item(&id("M"), &id("C")).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::MultiParentMove));

    planner.rename(&id("M"), "renamed.txt").unwrap();
    for parent in ["A", "B"] {
        let found = planner.find_by_name("renamed.txt", Some(&id(parent))).unwrap();
        assert_eq!(found.len(), 1);
    }
}

#[test]
fn missing_references() {
    let mut planner = create_test_planner();
    let ghost = id("ghost");

    let err = planner.rename(&ghost, "x").unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Missing(Role::Target)));
    let err = planner.create_folder("x", &ghost).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Missing(Role::Parent)));
    let err = planner.move_item(&id("F"), &ghost).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Missing(Role::NewParent)));
    let err = planner.get(&ItemId::mint()).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::Missing(Role::Item)));
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_idempotence() {
    let mut planner = create_test_planner();
    let base = planner.snapshot().clone();

    let x = planner.create_folder("X", &id("root")).unwrap();
    planner.move_item(&id("F"), &x).unwrap();
    planner.rename(&id("B"), "B2").unwrap();
    planner.delete_permanently(&id("G")).unwrap();

    planner.clear_ops();
    let once = planner.snapshot().clone();
    planner.clear_ops();

    assert_eq!(once, base);
    assert_eq!(planner.snapshot(), &base);
    assert!(planner.list_ops().is_empty());
    assert!(!planner.is_tombstoned(&id("G")));
    assert!(planner.get(&x).is_err());
}

// ============================================================================
// Plan Building
// ============================================================================

#[test]
fn delete_run_goes_deepest_first() {
    let mut planner = create_test_planner();
    planner.trash(&id("B")).unwrap();
    planner.delete_permanently(&id("G")).unwrap();
    planner.trash(&id("F")).unwrap();

    // Depths: B = 2, G = 4, F = 2.
    let plan = planner.build_plan();
    assert_eq!(apply_order_seqs(&plan), vec![1, 0, 2]);
}

#[test]
fn interleaved_deletes_keep_sequence() {
    let mut planner = create_test_planner();
    planner.trash(&id("B")).unwrap();
    planner.create_folder("X", &id("root")).unwrap();
    planner.delete_permanently(&id("G")).unwrap();

    let plan = planner.build_plan();
    assert_eq!(apply_order_seqs(&plan), vec![0, 1, 2]);
}

#[test]
fn depth_uses_the_planned_tree() {
    let mut planner = create_test_planner();
    // G moves up to the root (depth 1), so F (depth 2) is now deeper.
    planner.move_item(&id("G"), &id("root")).unwrap();
    planner.trash(&id("G")).unwrap();
    planner.trash(&id("F")).unwrap();

    let plan = planner.build_plan();
    assert_eq!(apply_order_seqs(&plan), vec![0, 2, 1]);
}

#[test]
fn preconditions_follow_action_and_known_times() {
    let mut planner = create_test_planner();
    planner.rename(&id("F"), "f2.txt").unwrap();
    planner.rename(&id("M"), "m2.txt").unwrap();
    planner.copy(&id("F"), &id("B"), None).unwrap();
    planner.create_folder("N", &id("A")).unwrap();
    planner.download_file(&id("G"), "/tmp/g", true).unwrap();

    let plan = planner.build_plan();
    let has_precondition: Vec<bool> = plan
        .operations
        .iter()
        .map(|op| op.precondition.is_some())
        .collect();
    assert_eq!(has_precondition, vec![true, false, true, false, true]);
}

#[test]
fn plan_survives_json_review() {
    let mut planner = create_test_planner();
    let x = planner.create_folder("X", &id("root")).unwrap();
    planner.upload_file("/data/photo.jpg", &x, Some("cover.jpg")).unwrap();
    planner.trash(&id("F")).unwrap();

    let plan = planner.build_plan();
    let json = plan.to_json().unwrap();
    let reviewed = Plan::from_json(&json).unwrap();
    assert_eq!(reviewed, plan);
    assert_eq!(reviewed.operations[1].result.as_ref().map(ItemId::is_pending), Some(true));
}

#[test]
fn empty_plan() {
    let planner = create_test_planner();
    let plan = planner.build_plan();
    assert!(plan.is_empty());
    assert!(plan.apply_order.is_empty());
    assert_eq!(plan.remote_root_id, id("root"));
}

// ============================================================================
// Scale
// ============================================================================

#[test]
fn deep_chain() {
    let mut records = vec![ItemRecord::folder("root", "Root", vec![])];
    let mut parent = id("root");
    for depth in 0..500 {
        let raw = format!("d{depth}");
        records.push(ItemRecord::folder(raw.as_str(), raw.as_str(), vec![parent.clone()]));
        parent = id(&raw);
    }
    let mut planner = Planner::from_records("root", records).unwrap();

    let err = planner.move_item(&id("d0"), &id("d499")).unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::MoveCycle));

    planner.trash(&id("d10")).unwrap();
    planner.trash(&id("d400")).unwrap();
    let plan = planner.build_plan();
    assert_eq!(apply_order_seqs(&plan), vec![1, 0]);
}

#[test]
fn wide_folder() {
    let mut planner = create_test_planner();
    for i in 0..1000 {
        planner.create_folder(&format!("child-{i:04}"), &id("B")).unwrap();
    }
    let children = planner.list_children(&id("B")).unwrap();
    assert_eq!(children.len(), 1002);
    assert!(children.windows(2).all(|w| w[0].name <= w[1].name));
    assert_eq!(planner.list_ops().last().unwrap().seq, 999);
}
