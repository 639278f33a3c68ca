//! Normalized claim set carried by every token
//!
//! Peers have historically disagreed on the claim body: the subject shows up
//! as `id`, `sub` or `subjectId`, and roles as `role` or `roles`, either a
//! single string or an array. All of those shapes deserialize into the one
//! [`Claims`] type here; issued tokens always use `{id, roles: [..], iat, exp}`.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Coarse-grained capability label carried in a token
///
/// Unknown labels are preserved as [`Role::Other`] so they round-trip but can
/// never satisfy a check for a known role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// End user enrolled as a student
    Student,
    /// End user teaching courses
    Professor,
    /// Administrator
    Admin,
    /// Identity of the auth service
    AuthService,
    /// Identity of the enrollment service
    EnrollmentService,
    /// Identity of the course service
    CourseService,
    /// Identity of the student service
    StudentService,
    /// Identity of the professor service
    ProfessorService,
    /// Any label this crate does not know
    Other(String),
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &str {
        match self {
            Self::Student => "STUDENT",
            Self::Professor => "PROFESSOR",
            Self::Admin => "ADMIN",
            Self::AuthService => "AUTH_SERVICE",
            Self::EnrollmentService => "ENROLLMENT_SERVICE",
            Self::CourseService => "COURSE_SERVICE",
            Self::StudentService => "STUDENT_SERVICE",
            Self::ProfessorService => "PROFESSOR_SERVICE",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "STUDENT" => Self::Student,
            "PROFESSOR" => Self::Professor,
            "ADMIN" => Self::Admin,
            "AUTH_SERVICE" => Self::AuthService,
            "ENROLLMENT_SERVICE" => Self::EnrollmentService,
            "COURSE_SERVICE" => Self::CourseService,
            "STUDENT_SERVICE" => Self::StudentService,
            "PROFESSOR_SERVICE" => Self::ProfessorService,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles, used both for a token's grants and a route's accepted roles
///
/// Deserializes from a single role string or an array of them; always
/// serializes as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the set holds `role`
    pub fn contains(&self, role: &Role) -> bool {
        self.0.contains(role)
    }

    /// Whether the two sets share at least one role
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.iter().any(|role| other.0.contains(role))
    }

    /// Add a role
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    /// Iterate in a stable order
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    /// Number of roles
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        roles.into_iter().collect()
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        Self::from([role])
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = &'a Role;
    type IntoIter = std::collections::btree_set::Iter<'a, Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleShape {
    One(Role),
    Many(Vec<Role>),
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RoleShape::deserialize(deserializer)? {
            RoleShape::One(role) => Self::from(role),
            RoleShape::Many(roles) => roles.into_iter().collect(),
        })
    }
}

/// Verified (or about to be signed) claim set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the token speaks for: a record id or a service identity
    #[serde(rename = "id", alias = "sub", alias = "subjectId")]
    pub subject_id: String,

    /// Granted roles; a token without any grants nothing
    #[serde(alias = "role", default)]
    pub roles: RoleSet,

    /// Issued-at, seconds since the Unix epoch
    #[serde(default)]
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

impl Claims {
    /// Claims issued now and expiring after `ttl`
    pub fn issued_now(subject_id: impl Into<String>, roles: RoleSet, ttl: Duration) -> Self {
        Self::issued_at(subject_id, roles, Utc::now(), ttl)
    }

    /// Claims issued at `issued_at` and expiring after `ttl`
    pub fn issued_at(
        subject_id: impl Into<String>,
        roles: RoleSet,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let iat = issued_at.timestamp();
        Self {
            subject_id: subject_id.into(),
            roles,
            iat,
            exp: iat.saturating_add(ttl.as_secs() as i64),
        }
    }

    /// Whether the subject holds `role`
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Whether the subject holds at least one of `required`
    pub fn has_any_role(&self, required: &RoleSet) -> bool {
        self.roles.intersects(required)
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whether the claims are expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}
