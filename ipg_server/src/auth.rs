//! Operator authentication.
//!
//! Callers present a static access token in the `ipg_access_token` header. Tokens are configured per principal (see
//! [`crate::config`]); admin principals also carry the user role.
use std::{
    collections::HashMap,
    fmt::Display,
    future::{ready, Ready},
};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use ipg_common::Secret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::ServerError;

pub const ACCESS_TOKEN_HEADER: &str = "ipg_access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn user<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), roles: vec![Role::User] }
    }

    pub fn admin<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), roles: vec![Role::User, Role::Admin] }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl FromRequest for Principal {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<Principal>().cloned().ok_or(ServerError::Unauthenticated))
    }
}

type TokenDigest = [u8; 32];

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.trim().as_bytes()).into()
}

/// The table of accepted access tokens.
///
/// Only SHA-256 digests of the tokens are kept, and presented tokens are hashed before the lookup, so the time a
/// lookup takes says nothing about how much of a real token the caller guessed.
#[derive(Clone, Default)]
pub struct AccessTokens {
    tokens: HashMap<TokenDigest, Principal>,
}

impl std::fmt::Debug for AccessTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.tokens.values().map(|p| p.name.as_str()).collect::<Vec<_>>();
        f.debug_struct("AccessTokens").field("principals", &names).finish()
    }
}

impl AccessTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: Secret<String>, principal: Principal) -> &mut Self {
        self.tokens.insert(digest(token.reveal()), principal);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn authenticate(&self, token: &str) -> Option<&Principal> {
        self.tokens.get(&digest(token))
    }
}
