/// Caller context threaded through every engine operation.
///
/// Produced by an authentication collaborator; the engine only checks the
/// flag and, for occupant-only cancellation, the user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Option<String>,
    authenticated: bool,
}

impl Session {
    pub fn authenticated(user: Option<String>) -> Self {
        Self {
            user: user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            authenticated: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// Shared-password gate. Both sides are upper-cased before comparison.
#[derive(Debug)]
pub struct PasswordGate {
    secret: String,
}

impl PasswordGate {
    pub fn new(secret: String) -> Self {
        Self {
            secret: secret.trim().to_uppercase(),
        }
    }

    pub fn unlock(&self, entered: &str, user: Option<String>) -> Session {
        if !self.secret.is_empty() && entered.trim().to_uppercase() == self.secret {
            Session::authenticated(user)
        } else {
            tracing::debug!("password rejected");
            Session::anonymous()
        }
    }
}
