use assertables::*;
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;

fn outcomes(permissions: &[ContextResourcePermission]) -> Vec<(String, bool, String)> {
    permissions
        .iter()
        .map(|p| (p.resource_name.clone(), p.permitted, p.attrs.resource.clone()))
        .collect()
}

fn reviewer<F>(decide: F, calls: Arc<AtomicUsize>) -> MockClusterClient
where
    F: Fn(&ResourceAttributes) -> anyhow::Result<bool> + Send + 'static,
{
    let mut client = MockClusterClient::new();
    client.expect_review_access().returning(move |attrs| {
        calls.fetch_add(1, Ordering::SeqCst);
        let allowed = decide(attrs)?;
        Ok(AccessReview { allowed, reason: (!allowed).then(|| format!("no {} for you", attrs.resource)) })
    });
    client
}

#[rstest]
#[tokio::test]
async fn test_wildcard_granted(pods_and_deployments: ResourceFactoryHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = reviewer(|_| Ok(true), calls.clone());
    let groups = pods_and_deployments.get_permissions_requests(TEST_NAMESPACE);

    let permissions = check_permissions(TEST_CONTEXT, &client, &groups).await;
    assert_eq!(
        outcomes(&permissions),
        vec![(PODS.into(), true, WILDCARD.into()), (DEPLOYMENTS.into(), true, WILDCARD.into())]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(permissions.iter().all(|p| p.context_name == TEST_CONTEXT && p.reason.is_none()));
}

#[rstest]
#[tokio::test]
async fn test_wildcard_denied_falls_back(pods_and_deployments: ResourceFactoryHandler) {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = reviewer(|attrs| Ok(attrs.resource == PODS), calls.clone());
    let groups = pods_and_deployments.get_permissions_requests(TEST_NAMESPACE);

    let permissions = check_permissions(TEST_CONTEXT, &client, &groups).await;
    assert_eq!(
        outcomes(&permissions),
        vec![(PODS.into(), true, PODS.into()), (DEPLOYMENTS.into(), false, DEPLOYMENTS.into())]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(permissions[1].reason, Some("no deployments for you".into()));
    assert_eq!(permissions[1].attrs.group, Some("apps".into()));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_failed_checks_count_as_denied(pods_and_deployments: ResourceFactoryHandler) {
    let client = reviewer(
        |attrs| {
            if attrs.resource == DEPLOYMENTS { Ok(true) } else { Err(anyhow!("authorization API unavailable")) }
        },
        Arc::new(AtomicUsize::new(0)),
    );
    let groups = pods_and_deployments.get_permissions_requests(TEST_NAMESPACE);

    let permissions = check_permissions(TEST_CONTEXT, &client, &groups).await;
    assert_eq!(
        outcomes(&permissions),
        vec![(PODS.into(), false, PODS.into()), (DEPLOYMENTS.into(), true, DEPLOYMENTS.into())]
    );
    assert_contains!(&permissions[0].reason.clone().unwrap(), "authorization API unavailable");
    assert!(logs_contain("treating as denied"));
}

#[rstest]
#[tokio::test]
async fn test_resources_without_fallback_denied_by_group() {
    let handler = ResourceFactoryHandler::new(vec![
        ResourceFactory::new("a", false, vec![PermissionRequest::watch_everything()]),
        ResourceFactory::new("b", false, vec![PermissionRequest::watch_everything(), watch_request(None, "b")]),
    ])
    .unwrap();
    let client = reviewer(|attrs| Ok(attrs.resource != WILDCARD), Arc::new(AtomicUsize::new(0)));

    let permissions = check_permissions(TEST_CONTEXT, &client, &handler.get_permissions_requests("")).await;
    assert_eq!(
        outcomes(&permissions),
        vec![("a".into(), false, WILDCARD.into()), ("b".into(), true, "b".into())]
    );
}

#[rstest]
#[tokio::test]
async fn test_checker_reports_once(pods_and_deployments: ResourceFactoryHandler) {
    let client: Arc<dyn ClusterClient> = Arc::new(reviewer(|_| Ok(true), Arc::new(AtomicUsize::new(0))));
    let groups = Arc::new(pods_and_deployments.get_permissions_requests(TEST_NAMESPACE));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let checker = ContextPermissionsChecker::start(3, TEST_CONTEXT, client, groups, tx);
    assert_eq!(checker.id(), 3);

    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.checker_id, 3);
    assert_eq!(msg.context_name, TEST_CONTEXT);
    assert_len_eq_x!(&msg.permissions, 2);
    assert_none!(rx.recv().await);
}

#[rstest]
#[tokio::test]
async fn test_checker_dispose_suppresses_result(pods_and_deployments: ResourceFactoryHandler) {
    let client: Arc<dyn ClusterClient> = Arc::new(reviewer(|_| Ok(true), Arc::new(AtomicUsize::new(0))));
    let groups = Arc::new(pods_and_deployments.get_permissions_requests(TEST_NAMESPACE));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let checker = ContextPermissionsChecker::start(1, TEST_CONTEXT, client, groups, tx);
    checker.dispose();
    assert_none!(rx.recv().await);
}
