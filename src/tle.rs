use std::f64::consts::PI;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::domain::OrbitRegime;

pub const EARTH_GM: f64 = 398_600.4418;
pub const EARTH_RADIUS_KM: f64 = 6378.137;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

const ANGLE_DECIMALS: i32 = 4;
const ECCENTRICITY_DECIMALS: i32 = 8;
const MEAN_MOTION_DECIMALS: i32 = 8;
const DISTANCE_DECIMALS: i32 = 2;
const VELOCITY_DECIMALS: i32 = 4;
const PERIOD_DECIMALS: i32 = 4;
const DRAG_DECIMALS: i32 = 14;

// 1-based inclusive columns of the published format.
const FIRST_DERIVATIVE: RangeInclusive<usize> = 34..=43;
const SECOND_DERIVATIVE: RangeInclusive<usize> = 45..=52;
const BSTAR: RangeInclusive<usize> = 54..=61;
const INCLINATION: RangeInclusive<usize> = 9..=16;
const RAAN: RangeInclusive<usize> = 18..=25;
const ECCENTRICITY: RangeInclusive<usize> = 27..=33;
const ARG_OF_PERIGEE: RangeInclusive<usize> = 35..=42;
const MEAN_ANOMALY: RangeInclusive<usize> = 44..=51;
const MEAN_MOTION: RangeInclusive<usize> = 53..=63;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedOrbitalParameters {
    pub inclination_deg: f64,
    pub eccentricity: f64,
    pub mean_motion_rev_per_day: f64,
    pub semi_major_axis_km: f64,
    pub perigee_altitude_km: f64,
    pub apogee_altitude_km: f64,
    pub period_minutes: f64,
    pub altitude_km: f64,
    pub velocity_km_s: f64,
    pub raan_deg: f64,
    pub arg_of_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub bstar: f64,
    pub mean_motion_dot: f64,
    pub mean_motion_ddot: f64,
}

impl DerivedOrbitalParameters {
    pub fn regime(&self) -> OrbitRegime {
        OrbitRegime::classify(self.altitude_km)
    }

    fn all_finite(&self) -> bool {
        [
            self.inclination_deg,
            self.eccentricity,
            self.mean_motion_rev_per_day,
            self.semi_major_axis_km,
            self.perigee_altitude_km,
            self.apogee_altitude_km,
            self.period_minutes,
            self.altitude_km,
            self.velocity_km_s,
            self.raan_deg,
            self.arg_of_perigee_deg,
            self.mean_anomaly_deg,
            self.bstar,
            self.mean_motion_dot,
            self.mean_motion_ddot,
        ]
        .iter()
        .all(|value| value.is_finite())
    }
}

pub fn derive(line1: &str, line2: &str) -> Option<DerivedOrbitalParameters> {
    if line1.trim().is_empty() || line2.trim().is_empty() {
        return None;
    }

    let mean_motion = parse_decimal(field(line2, MEAN_MOTION))?;
    if mean_motion.is_nan() || mean_motion <= 0.0 {
        return None;
    }

    let inclination = parse_decimal(field(line2, INCLINATION))?;
    let raan = parse_decimal(field(line2, RAAN))?;
    let eccentricity = parse_implied_fraction(field(line2, ECCENTRICITY))?;
    let arg_of_perigee = parse_decimal(field(line2, ARG_OF_PERIGEE))?;
    let mean_anomaly = parse_decimal(field(line2, MEAN_ANOMALY))?;

    let mean_motion_dot = parse_decimal_or_zero(field(line1, FIRST_DERIVATIVE))?;
    let mean_motion_ddot = parse_exponent_field(field(line1, SECOND_DERIVATIVE))?;
    let bstar = parse_exponent_field(field(line1, BSTAR))?;

    let period_seconds = SECONDS_PER_DAY / mean_motion;
    let semi_major_axis = (EARTH_GM * (period_seconds / (2.0 * PI)).powi(2)).cbrt();
    let altitude = semi_major_axis - EARTH_RADIUS_KM;
    let velocity = 2.0 * PI * semi_major_axis / period_seconds;
    let perigee = semi_major_axis * (1.0 - eccentricity) - EARTH_RADIUS_KM;
    let apogee = semi_major_axis * (1.0 + eccentricity) - EARTH_RADIUS_KM;

    let derived = DerivedOrbitalParameters {
        inclination_deg: round_to(inclination, ANGLE_DECIMALS),
        eccentricity: round_to(eccentricity, ECCENTRICITY_DECIMALS),
        mean_motion_rev_per_day: round_to(mean_motion, MEAN_MOTION_DECIMALS),
        semi_major_axis_km: round_to(semi_major_axis, DISTANCE_DECIMALS),
        perigee_altitude_km: round_to(perigee, DISTANCE_DECIMALS),
        apogee_altitude_km: round_to(apogee, DISTANCE_DECIMALS),
        period_minutes: round_to(period_seconds / 60.0, PERIOD_DECIMALS),
        altitude_km: round_to(altitude, DISTANCE_DECIMALS),
        velocity_km_s: round_to(velocity, VELOCITY_DECIMALS),
        raan_deg: round_to(raan, ANGLE_DECIMALS),
        arg_of_perigee_deg: round_to(arg_of_perigee, ANGLE_DECIMALS),
        mean_anomaly_deg: round_to(mean_anomaly, ANGLE_DECIMALS),
        bstar: round_to(bstar, DRAG_DECIMALS),
        mean_motion_dot: round_to(mean_motion_dot, DRAG_DECIMALS),
        mean_motion_ddot: round_to(mean_motion_ddot, DRAG_DECIMALS),
    };

    derived.all_finite().then_some(derived)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn field(line: &str, columns: RangeInclusive<usize>) -> &str {
    let start = columns.start() - 1;
    let end = (*columns.end()).min(line.len());
    line.get(start..end).unwrap_or("").trim()
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.parse::<f64>().ok()
}

fn parse_decimal_or_zero(value: &str) -> Option<f64> {
    if value.is_empty() {
        return Some(0.0);
    }
    parse_decimal(value)
}

fn parse_implied_fraction(value: &str) -> Option<f64> {
    if value.is_empty() || !value.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    format!("0.{value}").parse().ok()
}

// Decodes the packed exponent notation used by bstar and the second
// derivative of mean motion: `-11606-4` -> `-0.11606e-4`. Empty yields 0.
pub fn parse_exponent_field(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Some(0.0);
    }
    if value.len() < 3 || !value.is_ascii() {
        return None;
    }

    let (mantissa, exponent) = value.split_at(value.len() - 2);
    let mut exponent_chars = exponent.chars();
    let exponent_sign = match exponent_chars.next()? {
        '-' => '-',
        '+' | ' ' => '+',
        _ => return None,
    };
    let exponent_digit = exponent_chars.next().filter(char::is_ascii_digit)?;

    let (sign, digits) = match mantissa.chars().next()? {
        '-' => ("-", &mantissa[1..]),
        '+' => ("", &mantissa[1..]),
        _ => ("", mantissa),
    };
    let digits = digits.trim_start_matches('.');
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    format!("{sign}0.{digits}e{exponent_sign}{exponent_digit}")
        .parse()
        .ok()
}
