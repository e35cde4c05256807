//! Value Objects for the ordering domain

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

/// Server ids arrive either as JSON strings or as integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
            pub fn is_blank(&self) -> bool { self.0.trim().is_empty() }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self::new(value) }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

id_type!(
    /// Catalog menu entry id
    MenuId
);
id_type!(
    /// Store (restaurant) id; one order belongs to exactly one store
    StoreId
);
id_type!(
    /// Persisted order id
    OrderId
);
id_type!(
    /// Line id inside the remote cart
    CartItemId
);
id_type!(CustomerId);

/// Delivery address and contact phone captured before checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[validate(length(min = 1, message = "delivery address is required"))]
    pub delivery_address: String,
    #[validate(custom = "validate_phone")]
    pub phone_number: String,
}

impl ShippingInfo {
    /// Builds a validated shipping info. Surrounding whitespace is trimmed first.
    pub fn new(delivery_address: impl Into<String>, phone_number: impl Into<String>) -> Result<Self, ValidationErrors> {
        let info = Self::unchecked(delivery_address, phone_number);
        info.validate()?;
        Ok(info)
    }

    /// Builds shipping info as typed by the user, without validation.
    pub fn unchecked(delivery_address: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            delivery_address: delivery_address.into().trim().to_string(),
            phone_number: phone_number.into().trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool { self.delivery_address.is_empty() && self.phone_number.is_empty() }
}

/// Phone numbers are 10 to 15 ASCII digits.
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits_only = phone.chars().all(|c| c.is_ascii_digit());
    if !digits_only || !(10..=15).contains(&phone.len()) {
        let mut err = ValidationError::new("phone_number");
        err.message = Some("phone number must be 10 to 15 digits".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_accept_numbers_and_strings() {
        let from_num: MenuId = serde_json::from_str("42").unwrap();
        let from_str: MenuId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"42\"");
    }

    #[test]
    fn test_shipping_info_validation() {
        assert!(ShippingInfo::new("12 Hang Bai, Hanoi", "0912345678").is_ok());
        assert!(ShippingInfo::new("12 Hang Bai", "123456789012345").is_ok());
        assert!(ShippingInfo::new("12 Hang Bai", "091234567").is_err());
        assert!(ShippingInfo::new("12 Hang Bai", "1234567890123456").is_err());
        assert!(ShippingInfo::new("12 Hang Bai", "09123-45678").is_err());
        assert!(ShippingInfo::new("   ", "0912345678").is_err());
    }

    #[test]
    fn test_shipping_info_trims_input() {
        let info = ShippingInfo::new("  1 Le Loi  ", " 0912345678 ").unwrap();
        assert_eq!(info.delivery_address, "1 Le Loi");
        assert_eq!(info.phone_number, "0912345678");
    }
}
