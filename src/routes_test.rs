use super::*;

#[test]
fn default_policy_classifies_routes() {
    let policy = RoutePolicy::default();
    assert!(policy.is_public("/sign-in"));
    assert!(policy.is_public("/sign-up"));
    assert!(policy.is_public("/sign-in?next=/tasks"));
    assert!(!policy.is_public("/tasks"));

    assert!(policy.requires_session("/tasks"));
    assert!(policy.requires_session("/tasks/42"));
    assert!(!policy.requires_session("/"));
    assert!(!policy.requires_session("/sign-in"));
}

#[test]
fn prefix_match_respects_segments() {
    let policy = RoutePolicy::default();
    assert!(!policy.requires_session("/tasksearch"));
    assert!(!policy.is_public("/sign-inside"));
}

#[test]
fn gate_redirects_protected_without_refresh_cookie() {
    let policy = RoutePolicy::default();
    assert_eq!(policy.gate("/tasks", false), GateDecision::Redirect("/sign-in".to_owned()));
    assert_eq!(policy.gate("/tasks", true), GateDecision::Continue);
}

#[test]
fn gate_redirects_auth_pages_when_signed_in() {
    let policy = RoutePolicy::default();
    assert_eq!(policy.gate("/sign-up", true), GateDecision::Redirect("/tasks".to_owned()));
    assert_eq!(policy.gate("/sign-in", false), GateDecision::Continue);
}

#[test]
fn gate_ignores_unclassified_routes() {
    let policy = RoutePolicy::default();
    assert_eq!(policy.gate("/", false), GateDecision::Continue);
    assert_eq!(policy.gate("/", true), GateDecision::Continue);
}

#[test]
fn custom_policy_uses_supplied_targets() {
    let policy = RoutePolicy::new(["/login"], ["/app", "/settings"], "/login", "/app");
    assert_eq!(policy.sign_in(), "/login");
    assert_eq!(policy.home(), "/app");
    assert_eq!(policy.gate("/settings/profile", false), GateDecision::Redirect("/login".to_owned()));
    assert_eq!(policy.gate("/login", true), GateDecision::Redirect("/app".to_owned()));
}
