use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps a phone number or similar value so `{:?}` and `{}` never print it.
/// Serialization still emits the real value for API responses and pushes.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Partially hide a nickname before showing it to a stranger:
/// everything but the last two characters is kept, short names keep only
/// their first character.
pub fn mask_nickname(nickname: &str) -> String {
    let chars: Vec<char> = nickname.chars().collect();
    match chars.len() {
        0 => "User**".to_string(),
        1 | 2 => format!("{}**", chars[0]),
        n => format!("{}**", chars[..n - 2].iter().collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_nickname() {
        assert_eq!(mask_nickname(""), "User**");
        assert_eq!(mask_nickname("A"), "A**");
        assert_eq!(mask_nickname("Al"), "A**");
        assert_eq!(mask_nickname("Alice"), "Ali**");
        assert_eq!(mask_nickname("张三丰"), "张**");
    }

    #[test]
    fn test_masked_debug() {
        let phone = Masked("13800000000".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(phone.expose(), "13800000000");
    }
}
