use mk_core::prelude::*;
use rstest::fixture;
use serde_json::json;

use crate::constants::*;

#[fixture]
pub fn test_pod(#[default(TEST_POD)] name: &str) -> DynamicObject {
    DynamicObject::new(name, &POD_GVK.api_resource(PODS))
        .within(TEST_NAMESPACE)
        .data(json!({"spec": {"containers": [{"name": "nginx", "image": "nginx:latest"}]}}))
}

#[fixture]
pub fn test_deployment(#[default(TEST_DEPLOYMENT)] name: &str) -> DynamicObject {
    DynamicObject::new(name, &DEPLOYMENT_GVK.api_resource(DEPLOYMENTS))
        .within(TEST_NAMESPACE)
        .data(json!({"spec": {"replicas": 42}}))
}
