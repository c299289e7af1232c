//! Session authority
//!
//! This module provides:
//! - An employee directory with argon2-hashed passwords and department roles
//! - Opaque session tokens with a fixed validity window
//! - Token validation resolving to a [`Principal`]
//!
//! Every time-dependent call has an `_at` variant taking the current time in
//! Unix milliseconds so expiry can be exercised without sleeping.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::common::utils::timestamp_now_millis;
use crate::common::{Error, Result};

/// Role granting access to every department and to admin operations
pub const MANAGER_ROLE: &str = "MANAGER";

/// Random bytes per token
const TOKEN_RANDOM_BYTES: usize = 24;

/// Authenticated identity resolved from a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn is_manager(&self) -> bool {
        self.roles.iter().any(|r| r == MANAGER_ROLE)
    }

    /// Department members and managers may touch a department's files
    pub fn can_access(&self, department: &str) -> bool {
        self.is_manager() || self.roles.iter().any(|r| r == department)
    }

    pub fn require_manager(&self) -> Result<()> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(Error::Authorization(format!(
                "{} is not a manager",
                self.username
            )))
        }
    }
}

struct Employee {
    password_hash: String,
    roles: Vec<String>,
}

struct Session {
    username: String,
    expires_at: u64,
}

/// Issues and validates session tokens
pub struct SessionAuthority {
    employees: RwLock<HashMap<String, Employee>>,
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
    argon2: Argon2<'static>,
}

impl SessionAuthority {
    pub fn new(ttl: Duration) -> Self {
        Self {
            employees: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            ttl,
            argon2: Argon2::default(),
        }
    }

    /// Register a new employee. Usernames are unique.
    pub fn add_employee(&self, username: &str, password: &str, roles: Vec<String>) -> Result<()> {
        if username.is_empty() {
            return Err(Error::Authentication("empty username".into()));
        }
        if self.employees.read().unwrap().contains_key(username) {
            return Err(Error::ResourceState(format!(
                "username {} already exists",
                username
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("password hash: {}", e)))?
            .to_string();

        let mut employees = self.employees.write().unwrap();
        if employees.contains_key(username) {
            return Err(Error::ResourceState(format!(
                "username {} already exists",
                username
            )));
        }
        employees.insert(
            username.to_string(),
            Employee {
                password_hash,
                roles,
            },
        );
        tracing::info!("Employee {} registered", username);
        Ok(())
    }

    /// Check credentials and issue a fresh token
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        self.login_at(username, password, timestamp_now_millis())
    }

    pub fn login_at(&self, username: &str, password: &str, now_ms: u64) -> Result<String> {
        {
            let employees = self.employees.read().unwrap();
            let employee = employees
                .get(username)
                .ok_or_else(|| Error::Authentication(format!("unknown user {}", username)))?;
            let parsed = PasswordHash::new(&employee.password_hash)
                .map_err(|e| Error::Internal(format!("stored hash: {}", e)))?;
            self.argon2
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|_| Error::Authentication("wrong password".into()))?;
        }
        Ok(self.issue_at(username, now_ms))
    }

    /// Issue a token for an identity without checking credentials. Sessions
    /// already expired at `now_ms` are dropped on the way.
    pub fn issue_at(&self, username: &str, now_ms: u64) -> String {
        let random: [u8; TOKEN_RANDOM_BYTES] = rand::thread_rng().gen();
        let token = format!("{}-{}-{}", username, now_ms, URL_SAFE_NO_PAD.encode(random));

        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|_, session| session.expires_at >= now_ms);
        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: now_ms + self.ttl.as_millis() as u64,
            },
        );
        token
    }

    /// Sessions currently held, expired or not
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Resolve a token to its principal
    pub fn validate(&self, token: &str) -> Result<Principal> {
        self.validate_at(token, timestamp_now_millis())
    }

    pub fn validate_at(&self, token: &str, now_ms: u64) -> Result<Principal> {
        let session = self
            .sessions
            .read()
            .unwrap()
            .get(token)
            .map(|s| (s.username.clone(), s.expires_at));
        let (username, expires_at) = session.ok_or(Error::InvalidToken)?;
        if now_ms > expires_at {
            self.sessions.write().unwrap().remove(token);
            return Err(Error::InvalidToken);
        }

        let employees = self.employees.read().unwrap();
        let employee = employees.get(&username).ok_or(Error::InvalidToken)?;
        Ok(Principal {
            username,
            roles: employee.roles.clone(),
        })
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.validate(token).is_ok()
    }

    pub fn is_valid_at(&self, token: &str, now_ms: u64) -> bool {
        self.validate_at(token, now_ms).is_ok()
    }
}
