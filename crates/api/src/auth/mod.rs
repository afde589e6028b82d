//! Session access checks.
//!
//! The server treats access policy as an opaque yes/no question asked when a
//! connection joins a session. [`OpenAccess`] answers yes to everything and
//! is used when no `JWT_SECRET` is configured; [`JwtSessionAccess`] requires
//! a valid token that covers the session.

pub mod jwt;

use async_trait::async_trait;
use prospect_core::error::CoreError;

use self::jwt::{validate_token, JwtConfig};

/// User id recorded for connections that present no token.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Decides who a connection belongs to and which sessions it may observe.
#[async_trait]
pub trait SessionAccess: Send + Sync {
    /// Resolve the user behind the token presented at upgrade time.
    fn identify(&self, token: Option<&str>) -> Result<String, CoreError>;

    /// Check whether `conn_id` may join `session_id`.
    ///
    /// `token` is the one sent with `join-session`, falling back to the one
    /// presented at upgrade.
    async fn validate_session_access(
        &self,
        conn_id: &str,
        session_id: &str,
        token: Option<&str>,
    ) -> Result<(), CoreError>;
}

/// Allows every connection into every session.
pub struct OpenAccess;

#[async_trait]
impl SessionAccess for OpenAccess {
    fn identify(&self, _token: Option<&str>) -> Result<String, CoreError> {
        Ok(ANONYMOUS_USER.to_string())
    }

    async fn validate_session_access(
        &self,
        _conn_id: &str,
        _session_id: &str,
        _token: Option<&str>,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Requires an HS256 token whose claims cover the requested session.
pub struct JwtSessionAccess {
    config: JwtConfig,
}

impl JwtSessionAccess {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionAccess for JwtSessionAccess {
    fn identify(&self, token: Option<&str>) -> Result<String, CoreError> {
        match token {
            Some(token) => validate_token(token, &self.config)
                .map(|claims| claims.sub)
                .map_err(|e| CoreError::Unauthorized(format!("Invalid token: {e}"))),
            None => Ok(ANONYMOUS_USER.to_string()),
        }
    }

    async fn validate_session_access(
        &self,
        conn_id: &str,
        session_id: &str,
        token: Option<&str>,
    ) -> Result<(), CoreError> {
        let token =
            token.ok_or_else(|| CoreError::Unauthorized("A token is required to join".into()))?;
        let claims = validate_token(token, &self.config)
            .map_err(|e| CoreError::Unauthorized(format!("Invalid token: {e}")))?;

        if !claims.allows_session(session_id) {
            tracing::warn!(conn_id, session_id, user_id = %claims.sub, "Session access denied");
            return Err(CoreError::Forbidden(format!(
                "Token does not grant access to session {session_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::jwt::generate_access_token;
    use super::*;

    fn access() -> (JwtSessionAccess, JwtConfig) {
        let config = JwtConfig {
            secret: "session-access-test-secret-value".into(),
            access_token_expiry_mins: 5,
        };
        (JwtSessionAccess::new(config.clone()), config)
    }

    #[tokio::test]
    async fn open_access_allows_anything() {
        assert!(OpenAccess
            .validate_session_access("c1", "s1", None)
            .await
            .is_ok());
        assert_eq!(
            OpenAccess.identify(Some("garbage")).unwrap(),
            ANONYMOUS_USER
        );
    }

    #[tokio::test]
    async fn jwt_access_requires_a_token() {
        let (access, _) = access();
        assert_matches!(
            access.validate_session_access("c1", "s1", None).await,
            Err(CoreError::Unauthorized(_))
        );
        let result = access
            .validate_session_access("c1", "s1", Some("not-a-jwt"))
            .await;
        assert_matches!(result, Err(CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn jwt_access_checks_session_claims() {
        let (access, config) = access();
        let token = generate_access_token("u1", Some(vec!["s1".into()]), &config).unwrap();

        assert!(access
            .validate_session_access("c1", "s1", Some(&token))
            .await
            .is_ok());
        let result = access
            .validate_session_access("c1", "s2", Some(&token))
            .await;
        assert_matches!(result, Err(CoreError::Forbidden(_)));
        assert_eq!(access.identify(Some(&token)).unwrap(), "u1");
        assert_eq!(access.identify(None).unwrap(), ANONYMOUS_USER);
    }
}
