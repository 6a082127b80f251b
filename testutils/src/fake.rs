use httpmock::prelude::*;
use httpmock::{
    Mock,
    Then,
    When,
};
use serde_json::json;

pub const VERSION_PATH: &str = "/version";
pub const ACCESS_REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/selfsubjectaccessreviews";

pub struct MockServerBuilder {
    server: MockServer,
    handlers: Vec<Box<dyn Fn(When, Then)>>,
    mock_ids: Vec<usize>,
}

fn print_req(req: &HttpMockRequest) -> bool {
    // Use println instead of info! so that this works outside of the lib crate
    println!("    Received: {} {}", req.method(), req.uri().path());
    true
}

impl MockServerBuilder {
    pub fn new() -> MockServerBuilder {
        MockServerBuilder {
            server: MockServer::start(),
            handlers: vec![],
            mock_ids: vec![],
        }
    }

    pub fn assert(&self) {
        for id in &self.mock_ids {
            println!("checking assertions for mock {id}");
            Mock::new(*id, &self.server).assert()
        }
    }

    pub fn handle<F: Fn(When, Then) + 'static>(&mut self, f: F) -> &mut Self {
        self.handlers.push(Box::new(move |w, t| {
            let w = w.matches(print_req);
            f(w, t);
        }));
        self
    }

    pub fn handle_version(&mut self) -> &mut Self {
        self.handle(|when, then| {
            when.method(GET).path(VERSION_PATH);
            then.json_body(version_info());
        })
    }

    // Answers every access review whose body matches `body_regex` with the given verdict
    pub fn handle_access_review(&mut self, body_regex: &str, allowed: bool, reason: Option<&str>) -> &mut Self {
        let body_regex = body_regex.to_string();
        let resp = access_review_response(allowed, reason);
        self.handle(move |when, then| {
            when.method(POST).path(ACCESS_REVIEW_PATH).body_matches(body_regex.as_str());
            then.status(201).json_body(resp.clone());
        })
    }

    // Answers the initial list of a watch on `path`; the watch request that follows is left unhandled
    pub fn handle_list(&mut self, path: &str, kind: &str, items: Vec<serde_json::Value>) -> &mut Self {
        let path = path.to_string();
        let body = json!({
            "kind": kind,
            "apiVersion": "v1",
            "metadata": {"resourceVersion": "1"},
            "items": items,
        });
        self.handle(move |when, then| {
            when.method(GET).path(&path).query_param_missing("watch");
            then.json_body(body.clone());
        })
    }

    pub fn handle_not_found(&mut self, path: String) -> &mut Self {
        self.handle(move |when, then| {
            when.path(&path);
            then.status(404).json_body(status_not_found());
        })
    }

    pub fn build(&mut self) {
        for f in self.handlers.iter() {
            self.mock_ids.push(self.server.mock(f).id);
        }

        // Print all unmatched/unhandled requests for easier debugging;
        // this has to go last so that the other mock rules have a chance
        // to match first
        self.server.mock(|when, _| {
            when.matches(print_req);
        });
    }

    pub fn url(&self) -> http::Uri {
        http::Uri::try_from(self.server.url("/")).unwrap()
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }
}

pub fn make_fake_apiserver() -> (MockServerBuilder, kube::Client) {
    let builder = MockServerBuilder::new();
    let config = kube::Config::new(builder.url());
    let client = kube::Client::try_from(config).unwrap();
    (builder, client)
}

pub fn version_info() -> serde_json::Value {
    json!({
        "major": "1",
        "minor": "30",
        "gitVersion": "v1.30.2",
        "gitCommit": "39683505b630ff2121012f3c5b16215a1449d5ed",
        "gitTreeState": "clean",
        "buildDate": "2024-06-11T20:21:00Z",
        "goVersion": "go1.22.4",
        "compiler": "gc",
        "platform": "linux/amd64"
    })
}

pub fn access_review_response(allowed: bool, reason: Option<&str>) -> serde_json::Value {
    let mut status = json!({ "allowed": allowed });
    if let Some(reason) = reason {
        status["reason"] = json!(reason);
    }

    json!({
        "kind": "SelfSubjectAccessReview",
        "apiVersion": "authorization.k8s.io/v1",
        "metadata": {},
        "spec": {},
        "status": status,
    })
}

pub fn status_not_found() -> serde_json::Value {
    json!({
      "kind": "Status",
      "apiVersion": "v1",
      "metadata": {},
      "status": "Failure",
      "reason": "NotFound",
      "code": 404
    })
}
