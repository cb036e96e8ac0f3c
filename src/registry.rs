/// Registry of supported NOS Operational Forecast Systems.
///
/// Defines the canonical list of OFS models this service can process, along
/// with their forecast-hour ranges, daily cycle schedule, and file
/// availability delay. This is the single source of truth for model
/// identifiers — all other modules should reference models from here rather
/// than hardcoding them.

use crate::model::ModelType;

// ---------------------------------------------------------------------------
// Model metadata
// ---------------------------------------------------------------------------

/// Configuration for a single Operational Forecast System.
pub struct OfsModel {
    /// Lower-case model identifier as used in archive paths (e.g. "cbofs").
    pub id: &'static str,
    /// Geographic region identifier carried into artifact metadata.
    pub region: &'static str,
    /// Product description carried into artifact metadata.
    pub product: &'static str,
    /// Underlying modelling framework.
    pub model_type: ModelType,
    /// Last forecast lead hour produced by a cycle.
    pub max_hour: u16,
    /// Spacing of forecast lead hours (1 = hourly, 3 = 3-hourly).
    pub hour_step: u16,
    /// Hour-of-day values (UTC) at which daily cycles are issued.
    pub cycles: &'static [u32],
    /// Delay in minutes between cycle time and file availability on the
    /// archive server.
    pub availability_delay_min: i64,
}

impl OfsModel {
    /// Forecast lead hours produced per cycle, ascending: 0 through
    /// `max_hour` at `hour_step` spacing.
    pub fn forecast_hours(&self) -> Vec<u16> {
        (0..=self.max_hour).step_by(self.hour_step as usize).collect()
    }
}

/// All supported OFS models, ordered roughly east coast to west coast to
/// Great Lakes.
///
/// Sources:
///   - Cycle schedule and availability delays: NCEP NOMADS production
///     timetables (nomads.ncep.noaa.gov)
///   - Region/product identifiers: NOS S-111 product metadata
pub static MODEL_REGISTRY: &[OfsModel] = &[
    OfsModel {
        id: "cbofs",
        region: "Chesapeake_Bay",
        product: "ROMS_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Roms,
        max_hour: 48,
        hour_step: 1,
        cycles: &[0, 6, 12, 18],
        availability_delay_min: 85,
    },
    OfsModel {
        id: "dbofs",
        region: "Delaware_Bay",
        product: "ROMS_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Roms,
        max_hour: 48,
        hour_step: 1,
        cycles: &[0, 6, 12, 18],
        availability_delay_min: 80,
    },
    OfsModel {
        id: "gomofs",
        // 3-hourly output out to +72
        region: "Gulf_of_Maine",
        product: "ROMS_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Roms,
        max_hour: 72,
        hour_step: 3,
        cycles: &[0, 6, 12, 18],
        availability_delay_min: 134,
    },
    OfsModel {
        id: "tbofs",
        region: "Tampa_Bay",
        product: "ROMS_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Roms,
        max_hour: 48,
        hour_step: 1,
        cycles: &[0, 6, 12, 18],
        availability_delay_min: 74,
    },
    OfsModel {
        id: "nyofs",
        region: "New_York_Harbor",
        product: "POM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Pom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[5, 11, 17, 23],
        availability_delay_min: 60,
    },
    OfsModel {
        id: "negofs",
        region: "Northeast_Gulf_of_Mexico",
        product: "FVCOM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Fvcom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[3, 9, 15, 21],
        availability_delay_min: 95,
    },
    OfsModel {
        id: "nwgofs",
        region: "Northwest_Gulf_of_Mexico",
        product: "FVCOM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Fvcom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[3, 9, 15, 21],
        availability_delay_min: 90,
    },
    OfsModel {
        id: "ngofs",
        region: "Northern_Gulf_of_Mexico",
        product: "FVCOM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Fvcom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[3, 9, 15, 21],
        availability_delay_min: 50,
    },
    OfsModel {
        id: "sfbofs",
        region: "San_Francisco_Bay",
        product: "FVCOM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Fvcom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[3, 9, 15, 21],
        availability_delay_min: 55,
    },
    OfsModel {
        id: "leofs",
        region: "Lake_Erie",
        product: "FVCOM_Hydrodynamic_Model_Forecasts",
        model_type: ModelType::Fvcom,
        max_hour: 48,
        hour_step: 1,
        cycles: &[0, 6, 12, 18],
        availability_delay_min: 100,
    },
];

/// Looks up a model by identifier, case-insensitively. Returns `None` if
/// the identifier is not in the registry.
pub fn find_model(id: &str) -> Option<&'static OfsModel> {
    let id = id.to_ascii_lowercase();
    MODEL_REGISTRY.iter().find(|m| m.id == id)
}

/// Returns the identifiers of all supported models, suitable for CLI
/// usage/error messages.
pub fn all_model_ids() -> Vec<&'static str> {
    MODEL_REGISTRY.iter().map(|m| m.id).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
