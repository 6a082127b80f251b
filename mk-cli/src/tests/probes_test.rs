use mk_contexts::{
    ManagerConfig,
    PermissionGroup,
};

use super::*;

#[rstest]
fn test_render_builtin_probes() {
    let out = probes::render(&ManagerConfig::default(), "kube-public").unwrap();
    let groups: Vec<PermissionGroup> = serde_yaml::from_str(&out).unwrap();

    // Everything namespaced shares one wildcard probe; nodes gets its own cluster-wide one
    assert_len_eq_x!(&groups, 2);
    assert_eq!(groups[0].attrs.namespace.as_deref(), Some("kube-public"));
    assert_len_eq_x!(&groups[0].resources, 10);
    assert_len_eq_x!(&groups[0].on_deny_requests, 10);
    assert_eq!(groups[1].resources, vec!["nodes"]);
    assert_none!(groups[1].attrs.namespace);
}

#[rstest]
fn test_render_custom_resources() {
    let config: ManagerConfig = serde_yaml::from_str(
        "
resources:
  - resource: widgets
    namespaced: true
    watch: example.com/v1.Widget
    permissionsRequests:
      - group: example.com
        resource: widgets
        verb: watch
",
    )
    .unwrap();

    let out = probes::render(&config, "test").unwrap();
    assert_contains!(&out, "resource: widgets");
    assert_contains!(&out, "group: example.com");
    assert_not_contains!(out, "onDenyRequests");
}

#[rstest]
fn test_load_config_defaults() {
    assert_eq!(load_config(None).unwrap(), ManagerConfig::default());
    assert_err!(load_config(Some("/does/not/exist.yml")));
}
