use std::collections::BTreeMap;

use assertables::*;
use kube::runtime::reflector::Store;
use kube::runtime::reflector::store::Writer;
use serde_json::json;

use super::*;

fn store_with(ar: ApiResource, objs: Vec<DynamicObject>) -> Store<DynamicObject> {
    let mut writer = Writer::new(ar);
    for obj in objs {
        writer.apply_watcher_event(&Event::Apply(obj));
    }
    writer.as_reader()
}

fn reachable(context_name: &str) -> ContextHealthState {
    ContextHealthState {
        context_name: context_name.into(),
        phase: HealthPhase::Reachable,
        reachable: true,
        ..Default::default()
    }
}

fn permission(context_name: &str, resource_name: &str, permitted: bool) -> ContextResourcePermission {
    ContextResourcePermission {
        context_name: context_name.into(),
        resource_name: resource_name.into(),
        permitted,
        attrs: ResourceAttributes {
            namespace: Some(TEST_NAMESPACE.into()),
            group: None,
            resource: resource_name.into(),
            verb: WATCH_VERB.into(),
        },
        reason: None,
    }
}

#[fixture]
fn states() -> ContextsStatesRegistry {
    let mut states = ContextsStatesRegistry::new();
    states.set_current_context(Some(TEST_CONTEXT.into()));

    states.set_health(reachable(TEST_CONTEXT));
    states.set_cache(TEST_CONTEXT, PODS, store_with(POD_GVK.api_resource(PODS), vec![test_pod("pod1"), test_pod("pod2")]));
    states.set_cache(
        TEST_CONTEXT,
        DEPLOYMENTS,
        store_with(DEPLOYMENT_GVK.api_resource(DEPLOYMENTS), vec![test_deployment(TEST_DEPLOYMENT)]),
    );

    states.set_health(ContextHealthState {
        context_name: TEST_OTHER_CONTEXT.into(),
        phase: HealthPhase::Unreachable,
        error: Some("connection refused".into()),
        ..Default::default()
    });
    states.set_phase(TEST_CONTEXT, ContextPhase::Watching);
    states.set_phase(TEST_OTHER_CONTEXT, ContextPhase::HealthChecking);
    states
}

#[rstest]
fn test_general_state(states: ContextsStatesRegistry) {
    let general = states.general_state(TEST_CONTEXT).unwrap();
    assert!(general.reachable && !general.checking);
    assert_eq!(general.resources, BTreeMap::from([(DEPLOYMENTS.into(), 1), (PODS.into(), 2)]));

    let other = states.general_state(TEST_OTHER_CONTEXT).unwrap();
    assert!(!other.reachable);
    assert_eq!(other.error, Some("connection refused".into()));
    assert_is_empty!(&other.resources);

    assert_none!(states.general_state("nope"));
    assert_len_eq_x!(&states.general_states(), 2);
    assert_eq!(states.current_context_general_state(), Some(general));
}

#[rstest]
fn test_general_state_serialization(states: ContextsStatesRegistry) {
    let general = states.general_state(TEST_OTHER_CONTEXT).unwrap();
    assert_eq!(
        serde_json::to_value(&general).unwrap(),
        json!({"checking": false, "reachable": false, "error": "connection refused", "resources": {}})
    );
}

#[rstest]
fn test_counts_and_resources(states: ContextsStatesRegistry) {
    assert_eq!(states.resource_count(TEST_CONTEXT, PODS).unwrap().count, 2);
    assert_none!(states.resource_count(TEST_OTHER_CONTEXT, PODS));
    assert_eq!(
        states
            .resource_counts()
            .into_iter()
            .map(|c| (c.resource_name, c.count))
            .collect::<Vec<_>>(),
        vec![(DEPLOYMENTS.into(), 1), (PODS.into(), 2)]
    );

    let mut names: Vec<_> = states.resources(TEST_CONTEXT, PODS).unwrap().iter().map(|o| o.name_any()).collect();
    names.sort();
    assert_eq!(names, vec!["pod1", "pod2"]);

    let by_kind = states.resources_by_kind(DEPLOYMENTS);
    assert_len_eq_x!(&by_kind, 1);
    assert_eq!(by_kind[0].context_name, TEST_CONTEXT);
    assert_eq!(by_kind[0].items[0].name_any(), TEST_DEPLOYMENT);
    assert_is_empty!(&states.resources_by_kind(SERVICES));
}

#[rstest]
fn test_checking_states(mut states: ContextsStatesRegistry) {
    let mut checking = reachable(TEST_OTHER_CONTEXT);
    checking.checking = true;
    states.set_health(checking);
    assert_eq!(
        states.checking_states(),
        BTreeMap::from([(TEST_CONTEXT.into(), false), (TEST_OTHER_CONTEXT.into(), true)])
    );
}

#[rstest]
fn test_permissions_replaced(mut states: ContextsStatesRegistry) {
    states.set_permissions(TEST_CONTEXT, &[permission(TEST_CONTEXT, PODS, true), permission(TEST_CONTEXT, DEPLOYMENTS, false)]);
    states.set_permissions(TEST_OTHER_CONTEXT, &[permission(TEST_OTHER_CONTEXT, PODS, true)]);
    assert_len_eq_x!(&states.permissions(None), 3);

    states.set_permissions(TEST_CONTEXT, &[permission(TEST_CONTEXT, PODS, false)]);
    assert_eq!(states.permissions(Some(TEST_CONTEXT)), vec![permission(TEST_CONTEXT, PODS, false)]);

    states.clear_permissions(TEST_OTHER_CONTEXT);
    assert_is_empty!(&states.permissions(Some(TEST_OTHER_CONTEXT)));
}

#[rstest]
fn test_remove_context(mut states: ContextsStatesRegistry) {
    states.set_permissions(TEST_CONTEXT, &[permission(TEST_CONTEXT, PODS, true)]);
    states.remove_context(TEST_CONTEXT);

    assert_none!(states.health(TEST_CONTEXT));
    assert_none!(states.general_state(TEST_CONTEXT));
    assert_is_empty!(&states.permissions(Some(TEST_CONTEXT)));
    assert_is_empty!(&states.resource_counts());
    assert_eq!(states.phases().into_keys().collect::<Vec<_>>(), vec![TEST_OTHER_CONTEXT]);

    // The current context is kubeconfig state, not context state
    assert_eq!(states.current_context(), Some(TEST_CONTEXT));
    assert_none!(states.current_context_general_state());
}

#[rstest]
fn test_clear_caches_keeps_health(mut states: ContextsStatesRegistry) {
    states.clear_caches(TEST_CONTEXT);
    assert_is_empty!(&states.general_state(TEST_CONTEXT).unwrap().resources);

    states.clear();
    assert_is_empty!(&states.health_states());
    assert_is_empty!(&states.phases());
}
