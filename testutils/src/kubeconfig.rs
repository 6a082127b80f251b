use kube::config::Kubeconfig;
use rstest::fixture;

use crate::constants::*;

// Every context gets its own cluster and user, named after the context, and lives in
// TEST_NAMESPACE.  The first context is the current one.
pub fn test_kubeconfig_with_servers(contexts: &[(&str, &str)]) -> Kubeconfig {
    let mut clusters = String::new();
    let mut users = String::new();
    let mut ctxs = String::new();
    for (name, server) in contexts {
        clusters += &format!("- name: {name}-cluster\n  cluster:\n    server: {server}\n");
        users += &format!("- name: {name}-user\n  user:\n    token: {TEST_TOKEN}\n");
        ctxs += &format!(
            "- name: {name}\n  context:\n    cluster: {name}-cluster\n    user: {name}-user\n    namespace: {TEST_NAMESPACE}\n"
        );
    }
    let current = contexts.first().map(|(name, _)| *name).unwrap_or_default();

    let yaml = format!(
        "apiVersion: v1\nkind: Config\ncurrent-context: {current}\nclusters:\n{clusters}users:\n{users}contexts:\n{ctxs}"
    );
    Kubeconfig::from_yaml(&yaml).unwrap()
}

pub fn test_kubeconfig_for(names: &[&str]) -> Kubeconfig {
    let servers: Vec<_> = names.iter().map(|n| format!("https://{n}.example.com:6443")).collect();
    let contexts: Vec<_> = names.iter().zip(&servers).map(|(n, s)| (*n, s.as_str())).collect();
    test_kubeconfig_with_servers(&contexts)
}

#[fixture]
pub fn test_kubeconfig() -> Kubeconfig {
    test_kubeconfig_for(&[TEST_CONTEXT])
}
