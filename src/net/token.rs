//! 令牌颜色注册表：命名令牌类型、启用状态与锁计数.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ids::TokenId;

/// Display color attached to a token kind. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token color {0:?} is already defined")]
    DuplicateId(String),
    #[error("token color {name:?} is in use by {lock_count} marked places and may not be modified")]
    Locked { name: String, lock_count: u32 },
    #[error("token color {name:?} is still referenced by arc weights")]
    Referenced { name: String },
    #[error("token {0:?} is not defined")]
    Unknown(TokenId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenColor {
    name: String,
    enabled: bool,
    color: Rgb,
    // 持有该颜色非零标识的库所数; 非零时禁止修改颜色语义
    lock_count: u32,
}

impl TokenColor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }
}

/// Insertion-ordered arena of token colors. All lock accounting routes
/// through [`TokenRegistry::increment_lock`] and [`TokenRegistry::decrement_lock`],
/// which only marking mutation may call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRegistry {
    tokens: IndexMap<TokenId, TokenColor>,
    next: u32,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &mut self,
        name: impl Into<String>,
        enabled: bool,
        color: Rgb,
    ) -> Result<TokenId, TokenError> {
        let name = name.into();
        if self.lookup(&name).is_some() {
            return Err(TokenError::DuplicateId(name));
        }
        let id = TokenId::new(self.next);
        self.next += 1;
        self.tokens.insert(
            id,
            TokenColor {
                name,
                enabled,
                color,
                lock_count: 0,
            },
        );
        Ok(id)
    }

    pub fn get(&self, token: TokenId) -> Result<&TokenColor, TokenError> {
        self.tokens.get(&token).ok_or(TokenError::Unknown(token))
    }

    pub fn lookup(&self, name: &str) -> Option<TokenId> {
        self.tokens
            .iter()
            .find(|(_, color)| color.name == name)
            .map(|(id, _)| *id)
    }

    /// Flips the `enabled` flag. A color with a nonzero lock count may not
    /// be touched at all, even when the requested value equals the current one.
    pub fn set_enabled(&mut self, token: TokenId, value: bool) -> Result<(), TokenError> {
        let color = self
            .tokens
            .get_mut(&token)
            .ok_or(TokenError::Unknown(token))?;
        if color.lock_count > 0 {
            return Err(TokenError::Locked {
                name: color.name.clone(),
                lock_count: color.lock_count,
            });
        }
        color.enabled = value;
        Ok(())
    }

    /// Removes a color that no marked place holds. Arc references are the
    /// caller's concern; see `Net::remove_token`.
    pub fn remove(&mut self, token: TokenId) -> Result<TokenColor, TokenError> {
        let color = self.tokens.get(&token).ok_or(TokenError::Unknown(token))?;
        if color.lock_count > 0 {
            return Err(TokenError::Locked {
                name: color.name.clone(),
                lock_count: color.lock_count,
            });
        }
        Ok(self
            .tokens
            .shift_remove(&token)
            .expect("presence checked above"))
    }

    pub fn is_locked(&self, token: TokenId) -> Result<bool, TokenError> {
        Ok(self.get(token)?.is_locked())
    }

    pub fn lock_count(&self, token: TokenId) -> Result<u32, TokenError> {
        Ok(self.get(token)?.lock_count)
    }

    pub(crate) fn increment_lock(&mut self, token: TokenId) {
        let color = self
            .tokens
            .get_mut(&token)
            .expect("lock accounting on undefined token");
        color.lock_count += 1;
    }

    pub(crate) fn decrement_lock(&mut self, token: TokenId) {
        let color = self
            .tokens
            .get_mut(&token)
            .expect("lock accounting on undefined token");
        assert!(
            color.lock_count > 0,
            "lock count underflow for token color {:?}",
            color.name
        );
        color.lock_count -= 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &TokenColor)> {
        self.tokens.iter().map(|(id, color)| (*id, color))
    }

    /// Token ids whose colors currently participate in firing computations,
    /// in insertion order.
    pub fn enabled_tokens(&self) -> Vec<TokenId> {
        self.iter()
            .filter(|(_, color)| color.enabled)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
