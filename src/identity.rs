use std::env;

use lazy_static::lazy_static;
use regex::Regex;

/// Variable de entorno con el correo del usuario que ejecuta la herramienta
pub const USER_EMAIL_ENV: &str = "CARTERA_USER_EMAIL";

lazy_static! {
    static ref EMAIL: Option<Regex> = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok();
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(value))
}

/// Fuente del usuario actual. Sólo se usa para registrar quién ejecutó cada comando.
pub trait IdentityProvider {
    fn current_user_email(&self) -> Option<String>;
}

/// Lee el correo desde una variable de entorno
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    pub fn new() -> Self {
        Self::from_var(USER_EMAIL_ENV)
    }

    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_user_email(&self) -> Option<String> {
        env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| is_valid_email(v))
    }
}
