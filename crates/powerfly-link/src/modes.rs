//! ArduCopter flight mode numbers.

use crate::state::AutopilotType;

const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
];

fn mode_table(autopilot: AutopilotType) -> &'static [(u32, &'static str)] {
    match autopilot {
        AutopilotType::ArduPilotMega => COPTER_MODES,
        _ => &[],
    }
}

pub(crate) fn mode_name(autopilot: AutopilotType, custom_mode: u32) -> String {
    if autopilot != AutopilotType::ArduPilotMega {
        return format!("MODE({custom_mode})");
    }
    mode_table(autopilot)
        .iter()
        .find(|(number, _)| *number == custom_mode)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("UNKNOWN({custom_mode})"))
}

pub(crate) fn mode_number(autopilot: AutopilotType, name: &str) -> Option<u32> {
    mode_table(autopilot)
        .iter()
        .find(|(_, mode)| mode.eq_ignore_ascii_case(name))
        .map(|(number, _)| *number)
}
