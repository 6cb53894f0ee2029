//! Feature Vector Assembly

use crate::reading::MachineReading;
use crate::FeatureError;
use tracing::debug;

/// Number of features consumed by the classifier
pub const FEATURE_DIMENSION: usize = 12;

/// Feature names, in the column order the classifier was trained on
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSION] = [
    "Air temperature K",
    "Process temperature K",
    "Rotational speed rpm",
    "Torque Nm",
    "Tool wear min",
    "Air times process temp",
    "Rot spd ovr torque",
    "Rot spd times tool wr",
    "Torque times tool wr",
    "Type_M",
    "Type_L",
    "Type_H",
];

const AIR_TEMP: usize = 0;
const PROCESS_TEMP: usize = 1;
const ROT_SPEED: usize = 2;
const TORQUE: usize = 3;
const TOOL_WEAR: usize = 4;
const AIR_TIMES_PROCESS: usize = 5;
const ROT_OVER_TORQUE: usize = 6;
const ROT_TIMES_WEAR: usize = 7;
const TORQUE_TIMES_WEAR: usize = 8;
const TYPE_INDICATORS: usize = 9;

/// Feature vector for a single machine observation
/// Only `encode` builds one, so exactly one type indicator is set and every
/// value is finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_DIMENSION],
}

impl FeatureVector {
    /// Encode a reading into the classifier's feature layout
    pub fn encode(reading: &MachineReading) -> Result<Self, FeatureError> {
        reading.validate()?;

        let mut values = [0.0; FEATURE_DIMENSION];
        values[AIR_TEMP] = reading.air_temperature_k;
        values[PROCESS_TEMP] = reading.process_temperature_k;
        values[ROT_SPEED] = reading.rotational_speed_rpm;
        values[TORQUE] = reading.torque_nm;
        values[TOOL_WEAR] = reading.tool_wear_min;

        // Engineered interaction terms
        values[AIR_TIMES_PROCESS] = reading.air_temperature_k * reading.process_temperature_k;
        values[ROT_OVER_TORQUE] = reading.rotational_speed_rpm / reading.torque_nm;
        values[ROT_TIMES_WEAR] = reading.rotational_speed_rpm * reading.tool_wear_min;
        values[TORQUE_TIMES_WEAR] = reading.torque_nm * reading.tool_wear_min;

        values[TYPE_INDICATORS..].copy_from_slice(&reading.machine_type.indicators());

        // Products of finite inputs can still overflow
        if let Some((idx, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(FeatureError::NonFinite {
                field: FEATURE_NAMES[idx],
                value: *value,
            });
        }

        debug!("Encoded {} reading into {} features", reading.machine_type, FEATURE_DIMENSION);

        Ok(Self { values })
    }

    /// Raw values in `FEATURE_NAMES` order
    pub fn values(&self) -> &[f64; FEATURE_DIMENSION] {
        &self.values
    }

    /// Look up a feature by name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.values[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MachineType;
    use proptest::prelude::*;

    #[test]
    fn test_placeholder_reading_features() {
        let features = FeatureVector::encode(&MachineReading::default()).unwrap();

        assert_eq!(features.get("Air times process temp"), Some(90592.0));
        assert_eq!(features.get("Rot spd ovr torque"), Some(31.0));
        assert_eq!(features.get("Rot spd times tool wr"), Some(12400.0));
        assert_eq!(features.get("Torque times tool wr"), Some(400.0));
        assert_eq!(features.get("Type_M"), Some(1.0));
        assert_eq!(features.get("Type_L"), Some(0.0));
        assert_eq!(features.get("Type_H"), Some(0.0));
    }

    #[test]
    fn test_raw_fields_copied() {
        let reading = MachineReading {
            air_temperature_k: 300.5,
            process_temperature_k: 310.1,
            rotational_speed_rpm: 1420.0,
            torque_nm: 62.3,
            tool_wear_min: 199.0,
            machine_type: MachineType::L,
        };
        let features = FeatureVector::encode(&reading).unwrap();
        let v = features.values();

        assert_eq!(v[0], 300.5);
        assert_eq!(v[1], 310.1);
        assert_eq!(v[2], 1420.0);
        assert_eq!(v[3], 62.3);
        assert_eq!(v[4], 199.0);
        assert_eq!(&v[9..], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_zero_torque_never_encoded() {
        let reading = MachineReading {
            torque_nm: 0.0,
            ..Default::default()
        };
        assert_eq!(FeatureVector::encode(&reading), Err(FeatureError::ZeroTorque));
    }

    #[test]
    fn test_overflowing_product_rejected() {
        let reading = MachineReading {
            air_temperature_k: f64::MAX,
            process_temperature_k: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            FeatureVector::encode(&reading),
            Err(FeatureError::NonFinite { field: "Air times process temp", .. })
        ));
    }

    #[test]
    fn test_unknown_feature_name() {
        let features = FeatureVector::encode(&MachineReading::default()).unwrap();
        assert_eq!(features.get("Humidity"), None);
        assert_eq!(features.get("Torque Nm"), Some(50.0));
    }

    fn machine_type() -> impl Strategy<Value = MachineType> {
        prop_oneof![Just(MachineType::M), Just(MachineType::L), Just(MachineType::H)]
    }

    fn reading() -> impl Strategy<Value = MachineReading> {
        (
            250.0f64..350.0,
            250.0f64..350.0,
            1000.0f64..3000.0,
            prop_oneof![-80.0f64..-0.1, 0.1f64..80.0],
            0.0f64..300.0,
            machine_type(),
        )
            .prop_map(|(air, process, rot, torque, wear, machine_type)| MachineReading {
                air_temperature_k: air,
                process_temperature_k: process,
                rotational_speed_rpm: rot,
                torque_nm: torque,
                tool_wear_min: wear,
                machine_type,
            })
    }

    proptest! {
        #[test]
        fn prop_exactly_one_type_indicator(r in reading()) {
            let features = FeatureVector::encode(&r).unwrap();
            let indicators = &features.values()[9..];
            prop_assert_eq!(indicators.iter().filter(|v| **v == 1.0).count(), 1);
            prop_assert_eq!(indicators.iter().filter(|v| **v == 0.0).count(), 2);
        }

        #[test]
        fn prop_derived_fields_follow_formulas(r in reading()) {
            let f = FeatureVector::encode(&r).unwrap();
            prop_assert_eq!(f.values()[5], r.air_temperature_k * r.process_temperature_k);
            prop_assert_eq!(f.values()[6], r.rotational_speed_rpm / r.torque_nm);
            prop_assert_eq!(f.values()[7], r.rotational_speed_rpm * r.tool_wear_min);
            prop_assert_eq!(f.values()[8], r.torque_nm * r.tool_wear_min);
        }

        #[test]
        fn prop_type_switch_changes_only_indicators(r in reading(), other in machine_type()) {
            prop_assume!(other != r.machine_type);
            let a = FeatureVector::encode(&r).unwrap();
            let b = FeatureVector::encode(&MachineReading { machine_type: other, ..r }).unwrap();

            let changed: Vec<usize> = (0..FEATURE_DIMENSION)
                .filter(|&i| a.values()[i] != b.values()[i])
                .collect();
            // Old indicator drops to 0, new one rises to 1
            prop_assert_eq!(changed.len(), 2);
            prop_assert!(changed.iter().all(|&i| i >= 9));
        }

        #[test]
        fn prop_encoding_is_deterministic(r in reading()) {
            prop_assert_eq!(FeatureVector::encode(&r), FeatureVector::encode(&r));
        }
    }
}
