//! Shared fixtures for permission checker tests

#![allow(dead_code)]

use cretoai_permissions::{AccessChecker, Context, TypeCallback};
use serde_json::{json, Value};
use std::sync::Arc;

/// `role`: permission value must appear in `user.roles`
pub fn role_callback() -> TypeCallback {
    Arc::new(|role: &str, ctx: &Context| {
        ctx["user"]["roles"]
            .as_array()
            .map(|roles| roles.iter().any(|r| r == role))
            .unwrap_or(false)
    })
}

/// `flag`: only `testflag` is known, granted by `user.testflag`
pub fn flag_callback() -> TypeCallback {
    Arc::new(|flag: &str, ctx: &Context| {
        flag == "testflag" && ctx["user"]["testflag"].as_bool().unwrap_or(false)
    })
}

/// `misc`: any truthy boolean attribute of the user
pub fn misc_callback() -> TypeCallback {
    Arc::new(|item: &str, ctx: &Context| ctx["user"][item].as_bool().unwrap_or(false))
}

/// Checker with `role` registered
pub fn role_checker() -> AccessChecker {
    let checker = AccessChecker::new();
    checker.add_type("role", role_callback()).unwrap();
    checker
}

/// Checker with `flag`, `role` and `misc` registered
pub fn full_checker() -> AccessChecker {
    let checker = AccessChecker::new();
    checker
        .set_types(vec![
            ("flag", flag_callback()),
            ("role", role_callback()),
            ("misc", misc_callback()),
        ])
        .unwrap();
    checker
}

/// Context for a user holding `roles`
pub fn user_with_roles(roles: &[&str]) -> Value {
    json!({"user": {"id": 1, "roles": roles}})
}
