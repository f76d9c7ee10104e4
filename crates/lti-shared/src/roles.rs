//! Mapping from LIS role URIs to local roles.
//!
//! Learner-class roles are checked first and instructor-class roles second,
//! so a launch carrying both resolves to [`Role::Teacher`].

use crate::models::Role;

const MEMBERSHIP: &str = "http://purl.imsglobal.org/vocab/lis/v2/membership";
const INSTITUTION: &str = "http://purl.imsglobal.org/vocab/lis/v2/institution/person";

fn is_learner(uri: &str) -> bool {
    uri == format!("{MEMBERSHIP}#Learner")
        || uri == format!("{INSTITUTION}#Student")
        || uri == format!("{INSTITUTION}#Learner")
        || uri.starts_with(&format!("{MEMBERSHIP}/Learner#"))
}

fn is_instructor(uri: &str) -> bool {
    uri == format!("{MEMBERSHIP}#Instructor")
        || uri == format!("{INSTITUTION}#Instructor")
        || uri == format!("{INSTITUTION}#Faculty")
        || uri.starts_with(&format!("{MEMBERSHIP}/Instructor#"))
}

/// Resolve the local role for a set of role URIs.
pub fn map_roles<S: AsRef<str>>(roles: &[S]) -> Role {
    let mut role = Role::Guest;

    if roles.iter().any(|r| is_learner(r.as_ref())) {
        role = Role::Student;
    }
    if roles.iter().any(|r| is_instructor(r.as_ref())) {
        role = Role::Teacher;
    }

    role
}
