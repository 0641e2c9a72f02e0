use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sdds_model::{
    ColumnData, Definition, ItemClass, Kind, Layout, NameOptions, Page, SchemaMapping,
    SchemaOptions, Value, WildcardPattern,
};

fn input_layout() -> Layout {
    let mut layout = Layout::new();
    for (name, kind) in [("x", Kind::Double), ("y", Kind::Long), ("label", Kind::String)] {
        layout
            .define(ItemClass::Column, Definition::new(name, kind).with_units("m"))
            .expect("column");
    }
    layout
        .define(ItemClass::Parameter, Definition::new("run", Kind::Long))
        .expect("parameter");
    layout
}

#[test]
fn conform_carries_renamed_items() {
    let input = Arc::new(input_layout());
    let mut page = Page::new(Arc::clone(&input), 2);
    page.set_column("x", ColumnData::Double(vec![1.5, 2.5]))
        .expect("x");
    page.set_parameter("run", &Value::Long(7)).expect("run");
    page.set_index(4);

    let mut options = SchemaOptions::default();
    options.columns.deletes.push(WildcardPattern::new("y").expect("pattern"));
    options
        .columns
        .renames
        .push(("x".to_string(), "position".to_string()));
    let (mut output, mapping) = options.apply(&input).expect("apply");
    assert_eq!(output.names(ItemClass::Column), vec!["position", "label"]);
    assert_eq!(output.column("position").map(|d| d.units_or_empty()), Some("m"));

    output
        .define(ItemClass::Column, Definition::new("fresh", Kind::Short))
        .expect("new column");
    let out = Page::conform(Arc::new(output), &page, &mapping);
    assert_eq!(out.index(), 4);
    assert_eq!(out.column("position"), Some(&ColumnData::Double(vec![1.5, 2.5])));
    assert_eq!(out.column("fresh"), Some(&ColumnData::Short(vec![0, 0])));
    assert_eq!(out.parameter("run"), Some(&Value::Long(7)));
}

#[test]
fn identity_mapping_preserves_everything() {
    let layout = Arc::new(input_layout());
    let mut page = Page::new(Arc::clone(&layout), 1);
    page.set_column("label", ColumnData::String(vec!["a b".into()]))
        .expect("label");
    let copy = Page::conform(Arc::clone(&layout), &page, &SchemaMapping::identity(&layout));
    assert_eq!(copy.columns(), page.columns());
    assert_eq!(copy.parameters(), page.parameters());
}

proptest! {
    #[test]
    fn retained_literal_names_always_survive(
        names in proptest::collection::btree_set("[a-d]{1,3}", 1..8),
        delete_all in any::<bool>(),
        pick in any::<prop::sample::Index>(),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let kept = pick.get(&names).clone();
        let mut opts = NameOptions::default();
        if delete_all {
            opts.deletes.push(WildcardPattern::new("*").expect("pattern"));
        }
        opts.retains.push(WildcardPattern::new(&kept).expect("pattern"));
        let out = opts.apply(ItemClass::Column, &names).expect("apply");
        prop_assert!(out.iter().any(|(old, new)| old == &kept && new == &kept));
    }

    #[test]
    fn deleted_names_never_survive_without_retains(
        names in proptest::collection::btree_set("[a-c]{1,2}", 1..6),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let mut opts = NameOptions::default();
        opts.deletes.push(WildcardPattern::new("a*").expect("pattern"));
        let out = opts.apply(ItemClass::Column, &names).expect("apply");
        prop_assert!(out.iter().all(|(old, _)| !old.starts_with('a')));
        let expected = names.iter().filter(|n| !n.starts_with('a')).count();
        prop_assert_eq!(out.len(), expected);
    }
}
