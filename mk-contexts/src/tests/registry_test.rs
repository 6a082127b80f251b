use assertables::*;

use super::*;

#[fixture]
fn registry() -> ContextResourceRegistry<usize> {
    let mut registry = ContextResourceRegistry::new();
    registry.set("foo", PODS, 1);
    registry.set("foo", DEPLOYMENTS, 2);
    registry.set("bar", PODS, 3);
    registry
}

#[rstest]
fn test_get_and_set(mut registry: ContextResourceRegistry<usize>) {
    assert_eq!(registry.get("foo", PODS), Some(&1));
    assert!(registry.contains("bar", PODS));
    assert!(!registry.contains("bar", DEPLOYMENTS));
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.set("foo", PODS, 4), Some(1));
    assert_eq!(registry.get("foo", PODS), Some(&4));
}

#[rstest]
fn test_iteration_order(registry: ContextResourceRegistry<usize>) {
    let all: Vec<_> = registry.iter().map(|(c, r, v)| (c.to_string(), r.to_string(), *v)).collect();
    assert_eq!(
        all,
        vec![
            ("bar".into(), PODS.into(), 3),
            ("foo".into(), DEPLOYMENTS.into(), 2),
            ("foo".into(), PODS.into(), 1),
        ]
    );
    assert_eq!(registry.iter_context("foo").map(|(_, v)| *v).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(registry.iter_context("nope").count(), 0);
    assert_eq!(registry.contexts().collect::<Vec<_>>(), vec!["bar", "foo"]);
}

#[rstest]
fn test_remove(mut registry: ContextResourceRegistry<usize>) {
    assert_eq!(registry.remove("bar", PODS), Some(3));
    assert_none!(registry.remove("bar", PODS));
    assert_eq!(registry.contexts().collect::<Vec<_>>(), vec!["foo"]);

    let mut removed = registry.remove_context("foo");
    removed.sort();
    assert_eq!(removed, vec![1, 2]);
    assert!(registry.is_empty());
    assert_is_empty!(&registry.remove_context("foo"));
}

#[rstest]
fn test_drain(mut registry: ContextResourceRegistry<usize>) {
    assert_eq!(registry.drain(), vec![3, 2, 1]);
    assert_eq!(registry.len(), 0);
}
