//! Shared UI icons and emojis.
//!
//! Common emoji constants used across the UI for consistent styling,
//! with plain-text fallbacks for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Pipeline indicators
pub static DENY: Emoji<'_, '_> = Emoji("🚫 ", "[DENY]");
pub static REVISION: Emoji<'_, '_> = Emoji("🔄 ", "[REV]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static ARCHIVE: Emoji<'_, '_> = Emoji("📦 ", "[DONE]");
