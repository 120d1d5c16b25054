use serde::{Deserialize, Serialize};

pub const POSTCODE_LENGTH: usize = 5;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub street_name: String,
    pub street_number: String,
    pub city: String,
    pub code: String,
}

impl Address {
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_city(&mut self, city: impl Into<String>) {
        self.city = city.into();
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    pub fn set_street(&mut self, name: impl Into<String>, number: impl Into<String>) {
        self.street_name = name.into();
        self.street_number = number.into();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn render(&self) -> String {
        format!(
            "Delivery address: {}, {} {}, {}, {}",
            self.name, self.street_name, self.street_number, self.code, self.city
        )
    }
}

/// Length check only; numeric range and country rules are not applied.
pub fn validate_code(code: &str) -> bool {
    code.chars().count() == POSTCODE_LENGTH
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{capitalize, validate_code, Address};

    #[test]
    fn render_uses_fixed_field_order() {
        let mut address = Address::default();
        address.set_name("Ana");
        address.set_city("York");
        address.set_code("12345");
        address.set_street("main", "5");

        assert_eq!(address.render(), "Delivery address: Ana, main 5, 12345, York");
    }

    #[test]
    fn setters_overwrite_previous_values() {
        let mut address = Address::default();
        address.set_street("main", "5");
        address.set_street("high", "12b");

        assert_eq!(address.street_name, "high");
        assert_eq!(address.street_number, "12b");
    }

    #[test]
    fn default_address_is_empty() {
        assert!(Address::default().is_empty());
        assert_eq!(Address::default().render(), "Delivery address: ,  , , ");
    }

    #[test]
    fn postcode_validation_is_a_length_check() {
        assert!(validate_code("12345"));
        assert!(validate_code("00000"));
        assert!(validate_code("ab-12"));
        assert!(!validate_code("1234"));
        assert!(!validate_code("123456"));
        assert!(!validate_code(""));
    }

    #[test]
    fn postcode_validation_counts_characters_not_bytes() {
        assert!(validate_code("ÄÖÜßé"));
    }

    #[test]
    fn capitalize_matches_sentence_case() {
        assert_eq!(capitalize("ana"), "Ana");
        assert_eq!(capitalize("NEW YORK"), "New york");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("émile"), "Émile");
    }
}
