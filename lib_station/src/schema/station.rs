//! The weather-station upload field table.
//!
//! Source keys follow the station upload protocol (`ID`, `dateutc`, `tempf`, ...).
//! Output keys are the names every downstream format uses.

use super::field::{FieldKind, FieldSchema, UnitMetadata};

const TEMPERATURE: UnitMetadata = UnitMetadata {
    device_class: Some("temperature"),
    unit: Some("°C"),
    state_class: Some("measurement"),
};

const HUMIDITY: UnitMetadata = UnitMetadata {
    device_class: Some("humidity"),
    unit: Some("%"),
    state_class: Some("measurement"),
};

const PRESSURE: UnitMetadata = UnitMetadata {
    device_class: Some("pressure"),
    unit: Some("Pa"),
    state_class: Some("measurement"),
};

const fn measurement(unit: &'static str) -> UnitMetadata {
    UnitMetadata {
        device_class: None,
        unit: Some(unit),
        state_class: Some("measurement"),
    }
}

const fn rain() -> UnitMetadata {
    UnitMetadata {
        device_class: None,
        unit: Some("mm"),
        state_class: None,
    }
}

/// Fields of one station observation, in decode and encode order.
pub const STATION_FIELDS: &[FieldSchema] = &[
    FieldSchema::new("ID", "station_id", FieldKind::Text)
        .tag()
        .display("Station ID"),
    FieldSchema::new("softwaretype", "software_type", FieldKind::Text).display("Software type"),
    FieldSchema::new("dateutc", "observation_time", FieldKind::Timestamp)
        .timestamp()
        .display("Observation time")
        .unit(UnitMetadata {
            device_class: Some("timestamp"),
            unit: None,
            state_class: None,
        }),
    FieldSchema::new("tempf", "outside_temperature_celsius", FieldKind::NullableFloat)
        .converted("fahrenheit_to_celsius")
        .display("Outside temperature")
        .unit(TEMPERATURE),
    FieldSchema::new("indoortempf", "indoor_temperature_celsius", FieldKind::NullableFloat)
        .converted("fahrenheit_to_celsius")
        .display("Indoor temperature")
        .unit(TEMPERATURE),
    FieldSchema::new("dewptf", "dewpoint_celsius", FieldKind::NullableFloat)
        .converted("fahrenheit_to_celsius")
        .display("Dewpoint")
        .unit(TEMPERATURE),
    FieldSchema::new("windchillf", "windchill_celsius", FieldKind::NullableFloat)
        .converted("fahrenheit_to_celsius")
        .display("Windchill")
        .unit(TEMPERATURE),
    FieldSchema::new("humidity", "outside_relative_humidity", FieldKind::NullableFloat)
        .display("Outside relative humidity")
        .unit(HUMIDITY),
    FieldSchema::new("indoorhumidity", "indoor_relative_humidity", FieldKind::NullableFloat)
        .display("Indoor relative humidity")
        .unit(HUMIDITY),
    FieldSchema::new("baromin", "relative_atmospheric_pressure_pascal", FieldKind::NullableFloat)
        .converted("inches_of_mercury_to_pascal")
        .display("Relative atmospheric pressure")
        .unit(PRESSURE),
    FieldSchema::new("absbaromin", "absolute_atmospheric_pressure_pascal", FieldKind::NullableFloat)
        .converted("inches_of_mercury_to_pascal")
        .display("Absolute atmospheric pressure")
        .unit(PRESSURE),
    FieldSchema::new("UV", "uv_index", FieldKind::NullableFloat)
        .display("UV index")
        .unit(measurement("UV")),
    FieldSchema::new("solarradiation", "solar_radiation_watt_per_meter_squared", FieldKind::NullableFloat)
        .display("Solar radiation")
        .unit(measurement("W/m^2")),
    FieldSchema::new("winddir", "wind_direction_degrees", FieldKind::NullableInteger)
        .display("Wind direction")
        .unit(measurement("°")),
    FieldSchema::new("windspeedmph", "wind_speed_meters_per_second", FieldKind::NullableFloat)
        .converted("mph_to_meters_per_second")
        .display("Wind speed")
        .unit(measurement("m/s")),
    FieldSchema::new("windgustmph", "wind_gust_meters_per_second", FieldKind::NullableFloat)
        .converted("mph_to_meters_per_second")
        .display("Wind gust")
        .unit(measurement("m/s")),
    FieldSchema::new("rainin", "hourly_rain_millimeters", FieldKind::NullableFloat)
        .converted("inches_of_rain_to_millimeter")
        .display("Hourly rain")
        .unit(rain()),
    FieldSchema::new("dailyrainin", "daily_rain_millimeters", FieldKind::NullableFloat)
        .converted("inches_of_rain_to_millimeter")
        .display("Daily rain")
        .unit(rain()),
    FieldSchema::new("weeklyrainin", "weekly_rain_millimeters", FieldKind::NullableFloat)
        .converted("inches_of_rain_to_millimeter")
        .display("Weekly rain")
        .unit(rain()),
    FieldSchema::new("monthlyrainin", "monthly_rain_millimeters", FieldKind::NullableFloat)
        .converted("inches_of_rain_to_millimeter")
        .display("Monthly rain")
        .unit(rain()),
];
