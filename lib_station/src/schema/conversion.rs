//! # Unit Conversion Engine
//!
//! A fixed table of named, pure `f64 -> f64` transforms. Names are resolved
//! once when the schema registry is validated; an unknown name is a schema
//! error, never a decode-time failure.

/// A registered unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitConversion {
    FahrenheitToCelsius,
    InchesOfMercuryToPascal,
    MphToMetersPerSecond,
    InchesOfRainToMillimeter,
}

impl UnitConversion {
    /// Every registered conversion, in table order.
    pub const ALL: [UnitConversion; 4] = [
        UnitConversion::FahrenheitToCelsius,
        UnitConversion::InchesOfMercuryToPascal,
        UnitConversion::MphToMetersPerSecond,
        UnitConversion::InchesOfRainToMillimeter,
    ];

    /// Looks up a conversion by its registered name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitConversion::FahrenheitToCelsius => "fahrenheit_to_celsius",
            UnitConversion::InchesOfMercuryToPascal => "inches_of_mercury_to_pascal",
            UnitConversion::MphToMetersPerSecond => "mph_to_meters_per_second",
            UnitConversion::InchesOfRainToMillimeter => "inches_of_rain_to_millimeter",
        }
    }

    /// Applies the transform.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            UnitConversion::FahrenheitToCelsius => (value - 32.0) * 5.0 / 9.0,
            UnitConversion::InchesOfMercuryToPascal => value * 3386.0,
            UnitConversion::MphToMetersPerSecond => value * 0.44704,
            UnitConversion::InchesOfRainToMillimeter => value * 25.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values_are_exact() {
        assert_eq!(UnitConversion::FahrenheitToCelsius.apply(32.0), 0.0);
        assert_eq!(UnitConversion::FahrenheitToCelsius.apply(212.0), 100.0);
        assert_eq!(UnitConversion::InchesOfMercuryToPascal.apply(1.0), 3386.0);
        assert_eq!(UnitConversion::MphToMetersPerSecond.apply(1.0), 0.44704);
        assert_eq!(UnitConversion::InchesOfRainToMillimeter.apply(1.0), 25.4);
    }

    #[test]
    fn test_names_resolve_both_ways() {
        for conversion in UnitConversion::ALL {
            assert_eq!(UnitConversion::from_name(conversion.name()), Some(conversion));
        }
        assert_eq!(UnitConversion::from_name("kelvin_to_celsius"), None);
    }
}
