pub const TEST_NAMESPACE: &str = "test-namespace";
pub const TEST_CONTEXT: &str = "test-context";
pub const TEST_OTHER_CONTEXT: &str = "other-context";
pub const TEST_POD: &str = "the-pod";
pub const TEST_DEPLOYMENT: &str = "the-deployment";
pub const TEST_TOKEN: &str = "not-a-real-token";
