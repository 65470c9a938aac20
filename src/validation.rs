//! Form-level input checks applied before anything reaches the store.

use crate::error::{Result, WaitlistError};

pub const MIN_TABLE_SEATS: u32 = 2;
pub const MAX_TABLE_SEATS: u32 = 10;
pub const MAX_ARRIVAL_ESTIMATE_MINUTES: u32 = 120;

/// Where a player name was typed. Each surface has its own length bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSurface {
    /// Self check-in on the player app.
    Player,
    /// Staff adding a walk-in or scanning a QR code.
    Admin,
}

impl NameSurface {
    pub fn max_chars(&self) -> usize {
        match self {
            NameSurface::Player => 20,
            NameSurface::Admin => 50,
        }
    }
}

// Control characters plus zero-width and bidi formatting marks.
fn is_invisible(c: char) -> bool {
    c.is_control()
        || matches!(c, '\u{200B}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{FEFF}')
}

/// Strips invisible characters, trims, and enforces the surface's length bound.
pub fn player_name(raw: &str, surface: NameSurface) -> Result<String> {
    let cleaned: String = raw.chars().filter(|c| !is_invisible(*c)).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(WaitlistError::validation("player name is required"));
    }
    let max = surface.max_chars();
    if trimmed.chars().count() > max {
        return Err(WaitlistError::validation(format!(
            "player name must be at most {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn max_seats(seats: u32) -> Result<u32> {
    if (MIN_TABLE_SEATS..=MAX_TABLE_SEATS).contains(&seats) {
        Ok(seats)
    } else {
        Err(WaitlistError::validation(format!(
            "a table seats between {MIN_TABLE_SEATS} and {MAX_TABLE_SEATS} players"
        )))
    }
}

pub fn arrival_estimate(minutes: Option<u32>) -> Result<Option<u32>> {
    match minutes {
        Some(m) if m > MAX_ARRIVAL_ESTIMATE_MINUTES => Err(WaitlistError::validation(format!(
            "arrival estimate must be at most {MAX_ARRIVAL_ESTIMATE_MINUTES} minutes"
        ))),
        other => Ok(other),
    }
}

/// Formats a typed buy-in amount as a tier label, e.g. `"3400"` -> `"NT$3,400"`.
///
/// Every non-digit is discarded first, so `"NT$3,400"` normalizes to the same label.
pub fn buy_in_label(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(WaitlistError::validation("buy-in amount must be a number"));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| WaitlistError::validation("buy-in amount is too large"))?;
    if amount == 0 {
        return Err(WaitlistError::validation("buy-in amount must be positive"));
    }
    Ok(format!("NT${}", group_thousands(amount)))
}

fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Free-form rate labels (`"1/3"`, `"Tournament"`) used when renaming tiers.
pub fn rate_label(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WaitlistError::validation("rate is required"));
    }
    if trimmed.chars().any(is_invisible) {
        return Err(WaitlistError::validation("rate contains invalid characters"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_stripped() {
        assert_eq!(
            player_name("  Alice\u{200B}\n ", NameSurface::Player).unwrap(),
            "Alice"
        );
        assert_eq!(player_name("王小明", NameSurface::Player).unwrap(), "王小明");
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(
            player_name("   ", NameSurface::Admin),
            Err(WaitlistError::Validation(_))
        ));
        assert!(player_name("\u{FEFF}\t", NameSurface::Admin).is_err());
    }

    #[test]
    fn name_bound_depends_on_surface() {
        let name = "x".repeat(30);
        assert!(player_name(&name, NameSurface::Player).is_err());
        assert!(player_name(&name, NameSurface::Admin).is_ok());
        assert!(player_name(&"x".repeat(51), NameSurface::Admin).is_err());
        // Bound counts characters, not bytes.
        assert!(player_name(&"王".repeat(20), NameSurface::Player).is_ok());
    }

    #[test]
    fn seat_bounds() {
        assert!(max_seats(1).is_err());
        assert_eq!(max_seats(2).unwrap(), 2);
        assert_eq!(max_seats(10).unwrap(), 10);
        assert!(max_seats(11).is_err());
    }

    #[test]
    fn buy_in_labels() {
        assert_eq!(buy_in_label("3400").unwrap(), "NT$3,400");
        assert_eq!(buy_in_label("NT$3,400").unwrap(), "NT$3,400");
        assert_eq!(buy_in_label("1234567").unwrap(), "NT$1,234,567");
        assert_eq!(buy_in_label("500").unwrap(), "NT$500");
        assert!(buy_in_label("abc").is_err());
        assert!(buy_in_label("000").is_err());
    }

    #[test]
    fn arrival_estimates() {
        assert_eq!(arrival_estimate(None).unwrap(), None);
        assert_eq!(arrival_estimate(Some(45)).unwrap(), Some(45));
        assert!(arrival_estimate(Some(500)).is_err());
    }
}
