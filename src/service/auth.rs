//! Session tokens for the API v1
//!
//! A token is `<uuid>.<tag>`, the tag being a SHA-256 over the service
//! secret and the uuid. Tokens minted with another secret are refused
//! before the session table is even looked up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::store::ServiceStore;
use crate::error::{Error, Result};
use crate::logging::Logger;

#[derive(Debug, Clone)]
struct Session {
    wallet: String,
    expires_at: DateTime<Utc>,
}

pub struct Auth {
    log: Logger,
    secret: Vec<u8>,
    expiry: chrono::Duration,
    sessions: DashMap<String, Session>,
}

impl Auth {
    pub fn new(log: Logger, store: &dyn ServiceStore, expiry: Duration) -> Result<Self> {
        if !store.is_initialised()? {
            return Err(Error::ServiceNotInitialised);
        }
        let secret = store.token_secret()?;
        let expiry = chrono::Duration::from_std(expiry)
            .map_err(|e| Error::Config(format!("invalid token expiry: {}", e)))?;

        Ok(Self {
            log,
            secret,
            expiry,
            sessions: DashMap::new(),
        })
    }

    fn tag(&self, id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Open a session on `wallet` and return its token
    pub fn issue(&self, wallet: &str) -> Result<String> {
        self.issue_at(wallet, Utc::now())
    }

    fn issue_at(&self, wallet: &str, now: DateTime<Utc>) -> Result<String> {
        let expires_at = now.checked_add_signed(self.expiry).ok_or_else(|| {
            Error::Config(format!(
                "token expiry of {}s is out of range",
                self.expiry.num_seconds()
            ))
        })?;

        // Expired sessions are only dropped on use otherwise
        self.sessions.retain(|_, session| session.expires_at > now);

        let id = uuid::Uuid::new_v4().to_string();
        let token = format!("{}.{}", id, self.tag(&id));

        self.sessions.insert(
            token.clone(),
            Session {
                wallet: wallet.to_string(),
                expires_at,
            },
        );
        info!(parent: self.log.span(), wallet, "Session opened");
        Ok(token)
    }

    /// Return the wallet the token was issued for
    pub fn verify(&self, token: &str) -> Result<String> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String> {
        let (id, tag) = token.split_once('.').ok_or(Error::UnknownToken)?;
        if self.tag(id) != tag {
            return Err(Error::UnknownToken);
        }

        let session = self
            .sessions
            .get(token)
            .map(|s| s.value().clone())
            .ok_or(Error::UnknownToken)?;

        if session.expires_at <= now {
            self.sessions.remove(token);
            debug!(parent: self.log.span(), wallet = %session.wallet, "Session expired");
            return Err(Error::TokenExpired);
        }
        Ok(session.wallet)
    }

    pub fn revoke(&self, token: &str) -> Result<()> {
        let (_, session) = self.sessions.remove(token).ok_or(Error::UnknownToken)?;
        info!(parent: self.log.span(), wallet = %session.wallet, "Session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::FileServiceStore;
    use tempfile::{tempdir, TempDir};

    fn auth(expiry: Duration) -> (TempDir, Auth) {
        let home = tempdir().unwrap();
        let store = FileServiceStore::initialise(home.path()).unwrap();
        store.generate_token_secret(false).unwrap();
        let auth = Auth::new(Logger::root("test").named("auth"), &store, expiry).unwrap();
        (home, auth)
    }

    #[test]
    fn test_refuses_uninitialised_store() {
        let home = tempdir().unwrap();
        let store = FileServiceStore::initialise(home.path()).unwrap();

        assert!(matches!(
            Auth::new(Logger::root("test"), &store, Duration::from_secs(60)),
            Err(Error::ServiceNotInitialised)
        ));
    }

    #[test]
    fn test_issue_and_verify() {
        let (_home, auth) = auth(Duration::from_secs(60));

        let token = auth.issue("trader-1").unwrap();
        assert_eq!(auth.verify(&token).unwrap(), "trader-1");
    }

    #[test]
    fn test_expired_token() {
        let (_home, auth) = auth(Duration::from_secs(60));
        let token = auth.issue("trader-1").unwrap();

        let later = Utc::now() + chrono::Duration::seconds(61);
        assert!(matches!(auth.verify_at(&token, later), Err(Error::TokenExpired)));
        assert!(matches!(auth.verify(&token), Err(Error::UnknownToken)));
    }

    #[test]
    fn test_forged_and_revoked_tokens() {
        let (_home, auth) = auth(Duration::from_secs(60));
        let token = auth.issue("trader-1").unwrap();

        let (id, _) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", id, "0".repeat(64));
        assert!(matches!(auth.verify(&forged), Err(Error::UnknownToken)));
        assert!(matches!(auth.verify("garbage"), Err(Error::UnknownToken)));

        auth.revoke(&token).unwrap();
        assert!(matches!(auth.verify(&token), Err(Error::UnknownToken)));
        assert!(matches!(auth.revoke(&token), Err(Error::UnknownToken)));
    }

    #[test]
    fn test_tokens_do_not_survive_secret_rotation() {
        let (home, first) = auth(Duration::from_secs(60));
        let token = first.issue("trader-1").unwrap();

        let store = FileServiceStore::initialise(home.path()).unwrap();
        store.generate_token_secret(true).unwrap();
        let second = Auth::new(Logger::root("test"), &store, Duration::from_secs(60)).unwrap();

        assert!(matches!(second.verify(&token), Err(Error::UnknownToken)));
    }

    #[test]
    fn test_out_of_range_expiry_is_an_error() {
        let (_home, auth) = auth(Duration::from_secs(1_000_000_000_000_000));

        assert!(matches!(auth.issue("trader-1"), Err(Error::Config(_))));
        assert!(auth.sessions.is_empty());
    }

    #[test]
    fn test_issue_drops_expired_sessions() {
        let (_home, auth) = auth(Duration::from_secs(60));
        let stale = auth
            .issue_at("trader-1", Utc::now() - chrono::Duration::seconds(120))
            .unwrap();
        assert_eq!(auth.sessions.len(), 1);

        let fresh = auth.issue("trader-1").unwrap();
        assert_eq!(auth.sessions.len(), 1);
        assert!(auth.sessions.contains_key(&fresh));
        assert!(matches!(auth.verify(&stale), Err(Error::UnknownToken)));
    }
}
