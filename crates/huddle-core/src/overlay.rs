//! Remote cursor overlay
//!
//! Turns a presence list into the markers a client draws over the document:
//! one caret and label per remote user whose cursor payload decodes to
//! coordinates. The registry never looks inside the cursor; only this
//! module does.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::presence::PresenceView;

/// How long a user counts as typing after their last signal
pub const DEFAULT_TYPING_WINDOW: Duration = Duration::from_millis(3000);

/// Cursor coordinates carried in the presence payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl CursorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Decode a cursor payload; `None` for empty or foreign payloads
    pub fn decode(payload: &str) -> Option<Self> {
        if payload.trim().is_empty() {
            return None;
        }
        let position: CursorPosition = serde_json::from_str(payload).ok()?;
        (position.x.is_finite() && position.y.is_finite()).then_some(position)
    }

    /// Encode as a cursor payload for `heartbeat`
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One remote caret
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorMarker {
    pub user_id: String,
    pub label: String,
    pub color: String,
    pub position: CursorPosition,
}

/// Markers for every remote user with a usable cursor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CursorOverlay {
    pub markers: Vec<CursorMarker>,
}

impl CursorOverlay {
    /// Build the overlay, leaving out the local user's own record
    pub fn from_presence(views: &[PresenceView], local_user_id: Option<&str>) -> Self {
        let markers = views
            .iter()
            .filter(|view| Some(view.user_id.as_str()) != local_user_id)
            .filter_map(|view| {
                let position = CursorPosition::decode(&view.cursor)?;
                Some(CursorMarker {
                    user_id: view.user_id.clone(),
                    label: view
                        .display_name
                        .clone()
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| view.user_id.clone()),
                    color: view
                        .display_color
                        .clone()
                        .filter(|color| !color.is_empty())
                        .unwrap_or_else(|| color_for_user(&view.user_id)),
                    position,
                })
            })
            .collect();

        Self { markers }
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }
}

/// Stable `#rrggbb` color for a user id
///
/// Hue comes from a hash of the id; saturation and lightness are fixed so
/// every color reads well as a caret.
pub fn color_for_user(user_id: &str) -> String {
    // FNV-1a: stable across builds and platforms
    let hash = user_id.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    });
    let hue = (hash % 360) as f32 / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8
    )
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// Who is typing right now
///
/// Keeps the last typing signal per user. Informational only.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    window_ms: i64,
    last_signal: HashMap<String, i64>,
}

impl TypingIndicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis().min(i64::MAX as u128) as i64,
            last_signal: HashMap::new(),
        }
    }

    /// Record a typing signal from `user_id` at `now_ms`
    pub fn record(&mut self, user_id: &str, now_ms: i64) {
        let last = self.last_signal.entry(user_id.to_string()).or_insert(now_ms);
        *last = (*last).max(now_ms);
    }

    pub fn is_typing(&self, user_id: &str, now_ms: i64) -> bool {
        self.last_signal
            .get(user_id)
            .is_some_and(|last| now_ms.saturating_sub(*last) < self.window_ms)
    }

    /// Users currently typing, sorted
    pub fn typing_users(&self, now_ms: i64) -> Vec<String> {
        let mut users: Vec<String> = self
            .last_signal
            .keys()
            .filter(|user| self.is_typing(user, now_ms))
            .cloned()
            .collect();
        users.sort();
        users
    }

    /// Forget users whose window has passed
    pub fn prune(&mut self, now_ms: i64) {
        let window_ms = self.window_ms;
        self.last_signal
            .retain(|_, last| now_ms.saturating_sub(*last) < window_ms);
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(user_id: &str, cursor: &str, name: Option<&str>, color: Option<&str>) -> PresenceView {
        PresenceView {
            user_id: user_id.to_string(),
            display_name: name.map(String::from),
            display_color: color.map(String::from),
            cursor: cursor.to_string(),
        }
    }

    #[test]
    fn test_decode_cursor() {
        assert_eq!(
            CursorPosition::decode(r#"{"x": 10.5, "y": 3}"#),
            Some(CursorPosition::new(10.5, 3.0))
        );
        assert_eq!(CursorPosition::decode(""), None);
        assert_eq!(CursorPosition::decode("line:4"), None);
        assert_eq!(CursorPosition::decode(r#"{"x": 1}"#), None);

        let encoded = CursorPosition::new(4.0, 2.5).encode();
        assert_eq!(CursorPosition::decode(&encoded), Some(CursorPosition::new(4.0, 2.5)));
    }

    #[test]
    fn test_encode_non_finite_stays_valid_json() {
        let encoded = CursorPosition::new(f64::NAN, f64::INFINITY).encode();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert!(value["x"].is_null());
        assert_eq!(CursorPosition::decode(&encoded), None);
    }

    #[test]
    fn test_overlay_excludes_self_and_undecodable() {
        let views = vec![
            view("ada", r#"{"x":1,"y":2}"#, Some("Ada"), Some("#ff0000")),
            view("bob", "", Some("Bob"), None),
            view("cy", "not json", None, None),
            view("me", r#"{"x":5,"y":5}"#, Some("Me"), None),
        ];

        let overlay = CursorOverlay::from_presence(&views, Some("me"));
        assert_eq!(overlay.len(), 1);
        let marker = &overlay.markers[0];
        assert_eq!(marker.user_id, "ada");
        assert_eq!(marker.label, "Ada");
        assert_eq!(marker.color, "#ff0000");
        assert_eq!(marker.position, CursorPosition::new(1.0, 2.0));
    }

    #[test]
    fn test_label_and_color_fallbacks() {
        let views = vec![view("u-42", r#"{"x":0,"y":0}"#, None, Some(""))];

        let overlay = CursorOverlay::from_presence(&views, None);
        let marker = &overlay.markers[0];
        assert_eq!(marker.label, "u-42");
        assert_eq!(marker.color, color_for_user("u-42"));
    }

    #[test]
    fn test_color_for_user_is_stable_hex() {
        let color = color_for_user("ada");
        assert_eq!(color, color_for_user("ada"));
        assert_eq!(color.len(), 7);
        assert!(color.starts_with('#'));
        assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_typing_window() {
        let mut typing = TypingIndicator::new(Duration::from_millis(3000));
        typing.record("ada", 1_000);
        typing.record("bob", 2_000);

        assert!(typing.is_typing("ada", 3_999));
        assert!(!typing.is_typing("ada", 4_000));
        assert_eq!(typing.typing_users(4_500), vec!["bob".to_string()]);
        assert!(!typing.is_typing("nobody", 0));
    }

    #[test]
    fn test_typing_ignores_older_signal_and_prunes() {
        let mut typing = TypingIndicator::default();
        typing.record("ada", 5_000);
        typing.record("ada", 1_000);
        assert!(typing.is_typing("ada", 7_000));

        typing.prune(10_000);
        assert!(typing.typing_users(10_000).is_empty());
        assert!(!typing.is_typing("ada", 5_000));
    }
}
