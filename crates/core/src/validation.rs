//! Declarative request validation.
//!
//! Each endpoint is described by one or more [`Schema`] tables. A table is an
//! ordered list of [`FieldSpec`] rows evaluated in declaration order; every row
//! converts the raw JSON value to a typed [`FieldValue`] and then runs its
//! checks. Reports from all tables of an endpoint are merged by field name, so
//! the caller always sees every violation at once.

use crate::models::{CameraCredentials, CommandKind, CommandRequest, Velocity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Untyped request body
pub type RawInput = Map<String, Value>;

pub const INVALID_ADDRESS: &str = "Invalid IP address format. Expected a valid IPv4 address.";

/// Field name -> ordered violation messages. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport(BTreeMap<String, Vec<String>>);

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Append every entry of `other`; messages for a shared field are concatenated.
    pub fn merge(&mut self, other: ValidationReport) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut report = Self::default();
        report.add(field, message);
        report
    }
}

/// How the raw JSON value is converted before checks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Ipv4,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Ipv4(Ipv4Addr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    /// Missing field reports the given message
    Required(&'static str),
    /// Missing field takes this numeric value
    Default(f64),
}

/// A predicate over the converted value and the message reported when it fails
#[derive(Clone, Copy)]
pub struct Check {
    pub predicate: fn(&FieldValue) -> bool,
    pub message: &'static str,
}

#[derive(Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Alternate keys accepted in the raw input; the report still uses `name`
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub presence: Presence,
    pub checks: Vec<Check>,
}

impl FieldSpec {
    fn lookup<'a>(&self, raw: &'a RawInput) -> Option<&'a Value> {
        std::iter::once(self.name)
            .chain(self.aliases.iter().copied())
            .find_map(|key| raw.get(key))
    }

    fn convert(&self, value: &Value) -> Result<FieldValue, &'static str> {
        match self.kind {
            FieldKind::Text => match value {
                Value::String(s) => Ok(FieldValue::Text(s.clone())),
                _ => Err("Not a valid string."),
            },
            FieldKind::Number => {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                match number {
                    Some(n) if n.is_finite() => Ok(FieldValue::Number(n)),
                    _ => Err("Not a valid number."),
                }
            }
            FieldKind::Ipv4 => value
                .as_str()
                .and_then(|s| s.parse::<Ipv4Addr>().ok())
                .map(FieldValue::Ipv4)
                .ok_or(INVALID_ADDRESS),
        }
    }
}

/// An ordered table of field rules
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validate `raw` against this table. Unknown keys are ignored.
    pub fn validate(&self, raw: &RawInput) -> Result<ValidatedFields, ValidationReport> {
        let mut report = ValidationReport::default();
        let mut values = ValidatedFields::default();

        for spec in &self.fields {
            let value = match (spec.lookup(raw), spec.presence) {
                (None, Presence::Required(message)) => {
                    report.add(spec.name, message);
                    continue;
                }
                (None, Presence::Default(default)) => FieldValue::Number(default),
                (Some(Value::Null), _) => {
                    report.add(spec.name, "Field may not be null.");
                    continue;
                }
                (Some(raw_value), _) => match spec.convert(raw_value) {
                    Ok(value) => value,
                    Err(message) => {
                        report.add(spec.name, message);
                        continue;
                    }
                },
            };

            let failed: Vec<&'static str> = spec
                .checks
                .iter()
                .filter(|check| !(check.predicate)(&value))
                .map(|check| check.message)
                .collect();

            if failed.is_empty() {
                values.0.insert(spec.name, value);
            } else {
                for message in failed {
                    report.add(spec.name, message);
                }
            }
        }

        if report.is_empty() {
            Ok(values)
        } else {
            Err(report)
        }
    }
}

/// Typed values keyed by canonical field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedFields(BTreeMap<&'static str, FieldValue>);

impl ValidatedFields {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn ipv4(&self, name: &str) -> Option<Ipv4Addr> {
        match self.0.get(name) {
            Some(FieldValue::Ipv4(addr)) => Some(*addr),
            _ => None,
        }
    }

    fn extend(&mut self, other: ValidatedFields) {
        self.0.extend(other.0);
    }
}

/// How MoveFocus treats a missing `focus_speed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusSpeedPolicy {
    #[default]
    Required,
    Default(f64),
}

fn non_blank(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Text(s) if !s.trim().is_empty())
}

fn min_password_length(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Text(s) if s.chars().count() >= 8)
}

fn unit_range(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Number(n) if (-1.0..=1.0).contains(n))
}

fn speed_field(
    name: &'static str,
    aliases: &'static [&'static str],
    presence: Presence,
    message: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        aliases,
        kind: FieldKind::Number,
        presence,
        checks: vec![Check {
            predicate: unit_range,
            message,
        }],
    }
}

pub fn credentials_schema() -> Schema {
    Schema::new(vec![
        FieldSpec {
            name: "address",
            aliases: &["ip"],
            kind: FieldKind::Ipv4,
            presence: Presence::Required("IP address is required"),
            checks: Vec::new(),
        },
        FieldSpec {
            name: "username",
            aliases: &[],
            kind: FieldKind::Text,
            presence: Presence::Required("Username is required"),
            checks: vec![Check {
                predicate: non_blank,
                message: "Username cannot be empty",
            }],
        },
        FieldSpec {
            name: "password",
            aliases: &[],
            kind: FieldKind::Text,
            presence: Presence::Required("Password is required"),
            checks: vec![Check {
                predicate: min_password_length,
                message: "Password must be at least 8 characters long",
            }],
        },
    ])
}

pub fn profile_token_schema() -> Schema {
    Schema::new(vec![FieldSpec {
        name: "profile_token",
        aliases: &["profileToken"],
        kind: FieldKind::Text,
        presence: Presence::Required("profile_token is required"),
        checks: vec![Check {
            predicate: non_blank,
            message: "profile_token cannot be empty",
        }],
    }])
}

pub fn ptz_velocity_schema() -> Schema {
    Schema::new(vec![
        speed_field(
            "pan",
            &["pan_speed"],
            Presence::Default(0.0),
            "pan must be between -1.0 and 1.0",
        ),
        speed_field(
            "tilt",
            &["tilt_speed"],
            Presence::Default(0.0),
            "tilt must be between -1.0 and 1.0",
        ),
        speed_field(
            "zoom",
            &["zoom_speed"],
            Presence::Default(0.0),
            "zoom must be between -1.0 and 1.0",
        ),
    ])
}

pub fn focus_speed_schema(policy: FocusSpeedPolicy) -> Schema {
    let presence = match policy {
        FocusSpeedPolicy::Required => Presence::Required("focus_speed is required"),
        FocusSpeedPolicy::Default(speed) => Presence::Default(speed),
    };
    Schema::new(vec![speed_field(
        "focus_speed",
        &["speed"],
        presence,
        "focus_speed must be between -1.0 and 1.0",
    )])
}

/// The tables applied to one endpoint, in evaluation order
pub fn schemas_for(kind: CommandKind, focus: FocusSpeedPolicy) -> Vec<Schema> {
    match kind {
        CommandKind::FetchCameraData | CommandKind::StopFocus => vec![credentials_schema()],
        CommandKind::SelectProfile | CommandKind::StopPtz => {
            vec![credentials_schema(), profile_token_schema()]
        }
        CommandKind::MovePtz => vec![
            credentials_schema(),
            profile_token_schema(),
            ptz_velocity_schema(),
        ],
        CommandKind::MoveFocus => vec![credentials_schema(), focus_speed_schema(focus)],
    }
}

/// A request that passed every table of its endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCommand {
    pub credentials: CameraCredentials,
    pub request: CommandRequest,
}

/// Validate a raw body for `kind`, merging the reports of all its tables.
pub fn validate_command(
    kind: CommandKind,
    raw: &RawInput,
    focus: FocusSpeedPolicy,
) -> Result<ValidatedCommand, ValidationReport> {
    let mut report = ValidationReport::default();
    let mut fields = ValidatedFields::default();

    for schema in schemas_for(kind, focus) {
        match schema.validate(raw) {
            Ok(values) => fields.extend(values),
            Err(violations) => report.merge(violations),
        }
    }

    if !report.is_empty() {
        return Err(report);
    }

    build_command(kind, &fields)
        .ok_or_else(|| ValidationReport::single("_schema", "Validated fields are incomplete"))
}

fn build_command(kind: CommandKind, fields: &ValidatedFields) -> Option<ValidatedCommand> {
    let credentials = CameraCredentials::new(
        fields.ipv4("address")?,
        fields.text("username")?,
        fields.text("password")?,
    );
    let token = || fields.text("profile_token").map(str::to_string);

    let request = match kind {
        CommandKind::FetchCameraData => CommandRequest::FetchCameraData,
        CommandKind::SelectProfile => CommandRequest::SelectProfile {
            profile_token: token()?,
        },
        CommandKind::MovePtz => CommandRequest::MovePtz {
            profile_token: token()?,
            velocity: Velocity {
                pan: fields.number("pan")?,
                tilt: fields.number("tilt")?,
                zoom: fields.number("zoom")?,
            },
        },
        CommandKind::StopPtz => CommandRequest::StopPtz {
            profile_token: token()?,
        },
        CommandKind::MoveFocus => CommandRequest::MoveFocus {
            speed: fields.number("focus_speed")?,
        },
        CommandKind::StopFocus => CommandRequest::StopFocus,
    };

    Some(ValidatedCommand { credentials, request })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawInput {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    fn creds() -> Value {
        json!({"address": "192.168.1.10", "username": "admin", "password": "password1"})
    }

    fn with(mut base: Value, extra: Value) -> RawInput {
        if let (Some(b), Value::Object(e)) = (base.as_object_mut(), extra) {
            b.extend(e);
        }
        raw(base)
    }

    #[test]
    fn test_valid_credentials() {
        let cmd = validate_command(
            CommandKind::FetchCameraData,
            &raw(creds()),
            FocusSpeedPolicy::Required,
        )
        .unwrap();
        assert_eq!(cmd.credentials.address, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(cmd.credentials.username, "admin");
        assert_eq!(cmd.request, CommandRequest::FetchCameraData);
    }

    #[test]
    fn test_address_rejections() {
        for bad in ["not.an.ip", "192.168.1", "192.168.1.256", "1.2.3.4.5", "a.b.c.d", ""] {
            let input = with(creds(), json!({"address": bad}));
            let report = credentials_schema().validate(&input).unwrap_err();
            assert_eq!(report.get("address").unwrap(), [INVALID_ADDRESS], "input {bad:?}");
        }
    }

    #[test]
    fn test_ip_alias_is_accepted() {
        let input = raw(json!({"ip": "10.0.0.2", "username": "admin", "password": "password1"}));
        let fields = credentials_schema().validate(&input).unwrap();
        assert_eq!(fields.ipv4("address"), Some(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_blank_username() {
        let input = with(creds(), json!({"username": "   "}));
        let report = credentials_schema().validate(&input).unwrap_err();
        assert_eq!(report.get("username").unwrap(), ["Username cannot be empty"]);
    }

    #[test]
    fn test_password_length_boundary() {
        let short = with(creds(), json!({"password": "1234567"}));
        let report = credentials_schema().validate(&short).unwrap_err();
        assert_eq!(
            report.get("password").unwrap(),
            ["Password must be at least 8 characters long"]
        );

        let exact = with(creds(), json!({"password": "12345678"}));
        assert!(credentials_schema().validate(&exact).is_ok());
    }

    #[test]
    fn test_missing_required_fields() {
        let report = credentials_schema().validate(&RawInput::new()).unwrap_err();
        assert_eq!(report.get("address").unwrap(), ["IP address is required"]);
        assert_eq!(report.get("username").unwrap(), ["Username is required"]);
        assert_eq!(report.get("password").unwrap(), ["Password is required"]);
    }

    #[test]
    fn test_null_and_wrong_types() {
        let input = raw(json!({"address": null, "username": 5, "password": "password1"}));
        let report = credentials_schema().validate(&input).unwrap_err();
        assert_eq!(report.get("address").unwrap(), ["Field may not be null."]);
        assert_eq!(report.get("username").unwrap(), ["Not a valid string."]);
    }

    #[test]
    fn test_speed_bounds_are_inclusive() {
        for ok in [-1.0, 1.0, 0.0, 0.25] {
            let input = raw(json!({"pan": ok, "tilt": ok, "zoom": ok}));
            assert!(ptz_velocity_schema().validate(&input).is_ok(), "{ok}");
        }
        for bad in [1.0001, -1.0001] {
            let input = raw(json!({"pan": bad, "tilt": bad, "zoom": bad}));
            let report = ptz_velocity_schema().validate(&input).unwrap_err();
            assert_eq!(report.get("pan").unwrap(), ["pan must be between -1.0 and 1.0"]);
            assert_eq!(report.get("tilt").unwrap(), ["tilt must be between -1.0 and 1.0"]);
            assert_eq!(report.get("zoom").unwrap(), ["zoom must be between -1.0 and 1.0"]);
        }
    }

    #[test]
    fn test_velocity_defaults_to_zero() {
        let input = with(creds(), json!({"profile_token": "Profile_1"}));
        let cmd =
            validate_command(CommandKind::MovePtz, &input, FocusSpeedPolicy::Required).unwrap();
        assert_eq!(
            cmd.request,
            CommandRequest::MovePtz {
                profile_token: "Profile_1".to_string(),
                velocity: Velocity::default(),
            }
        );
    }

    #[test]
    fn test_numeric_strings_and_aliases() {
        let input = raw(json!({"pan_speed": "0.5", "tilt_speed": -0.5, "zoom": "abc"}));
        let report = ptz_velocity_schema().validate(&input).unwrap_err();
        assert_eq!(report.get("zoom").unwrap(), ["Not a valid number."]);
        assert!(!report.contains("pan"));
        assert!(!report.contains("tilt"));
    }

    #[test]
    fn test_reports_are_merged_across_schemas() {
        let input = with(
            creds(),
            json!({"address": "999.1.1.1", "profile_token": "p", "pan": 2.0}),
        );
        let report = validate_command(CommandKind::MovePtz, &input, FocusSpeedPolicy::Required)
            .unwrap_err();
        assert_eq!(report.get("address").unwrap(), [INVALID_ADDRESS]);
        assert_eq!(report.get("pan").unwrap(), ["pan must be between -1.0 and 1.0"]);
        assert_eq!(report.fields().count(), 2);
    }

    #[test]
    fn test_merge_concatenates_same_field() {
        let mut a = ValidationReport::single("address", "first");
        a.merge(ValidationReport::single("address", "second"));
        assert_eq!(a.get("address").unwrap(), ["first", "second"]);
    }

    #[test]
    fn test_blank_profile_token() {
        let input = with(creds(), json!({"profile_token": "  "}));
        let report = validate_command(CommandKind::StopPtz, &input, FocusSpeedPolicy::Required)
            .unwrap_err();
        assert_eq!(report.get("profile_token").unwrap(), ["profile_token cannot be empty"]);
    }

    #[test]
    fn test_focus_policy() {
        let strict =
            validate_command(CommandKind::MoveFocus, &raw(creds()), FocusSpeedPolicy::Required)
                .unwrap_err();
        assert_eq!(strict.get("focus_speed").unwrap(), ["focus_speed is required"]);

        let lenient = validate_command(
            CommandKind::MoveFocus,
            &raw(creds()),
            FocusSpeedPolicy::Default(0.5),
        )
        .unwrap();
        assert_eq!(lenient.request, CommandRequest::MoveFocus { speed: 0.5 });
    }

    #[test]
    fn test_focus_speed_bounds_are_inclusive() {
        for policy in [FocusSpeedPolicy::Required, FocusSpeedPolicy::Default(0.0)] {
            for ok in [-1.0, 1.0] {
                let input = with(creds(), json!({"focus_speed": ok}));
                let cmd = validate_command(CommandKind::MoveFocus, &input, policy).unwrap();
                assert_eq!(cmd.request, CommandRequest::MoveFocus { speed: ok });
            }
            for bad in [1.0001, -1.0001] {
                let input = with(creds(), json!({"focus_speed": bad}));
                let report = validate_command(CommandKind::MoveFocus, &input, policy).unwrap_err();
                assert_eq!(
                    report.get("focus_speed").unwrap(),
                    ["focus_speed must be between -1.0 and 1.0"]
                );
            }
        }
    }

    #[test]
    fn test_focus_speed_alias_is_range_checked() {
        let input = with(creds(), json!({"speed": -1.5}));
        let report = focus_speed_schema(FocusSpeedPolicy::Required)
            .validate(&input)
            .unwrap_err();
        assert_eq!(
            report.get("focus_speed").unwrap(),
            ["focus_speed must be between -1.0 and 1.0"]
        );
        assert!(!report.contains("speed"));

        let input = with(creds(), json!({"speed": 1.0}));
        let fields = focus_speed_schema(FocusSpeedPolicy::Required)
            .validate(&input)
            .unwrap();
        assert_eq!(fields.number("focus_speed"), Some(1.0));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let input = with(creds(), json!({"colour": "blue", "extra": [1, 2]}));
        let result = validate_command(CommandKind::StopFocus, &input, FocusSpeedPolicy::Required);
        assert!(result.is_ok());
    }

    #[test]
    fn test_report_serializes_as_map() {
        let report = ValidationReport::single("password", "too short");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, json!({"password": ["too short"]}));
    }
}
