use hubctl_config::{BindingAction, Config, SensorMode, load_toml};
use rstest::rstest;

#[test]
fn empty_file_gives_documented_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.hub.motor_port, 0);
    assert_eq!(cfg.hub.estop_ports, vec![0, 1, 2]);
    assert!(cfg.hub.direct_mode);
    assert_eq!(cfg.hub.color_sensor_port, 0x12);
    assert_eq!(cfg.hub.sensor_mode, SensorMode::Rgb);
    assert_eq!(cfg.dispatcher.normal_wait_ms, 100);
    assert!(!cfg.stabilizer.enabled);
    assert_eq!((cfg.stabilizer.threshold, cfg.stabilizer.capacity), (3, 5));
    assert_eq!(cfg.trigger.required_ms, 150);
    assert_eq!(cfg.trigger.bindings.len(), 1);
    assert_eq!(cfg.mapper.tick_ms, 200);
    assert_eq!(cfg.mapper.bands.len(), 5);
    assert_eq!(cfg.direction.pause_ms, 400);
}

#[test]
fn full_file_parses() {
    let toml = r#"
[hub]
motor_port = 1
estop_ports = [1]
direct_mode = false
max_power = 80
color_sensor_port = 0x13
sensor_mode = "color_index"

[stabilizer]
enabled = true
threshold = 4
capacity = 6

[trigger]
required_ms = 100
dwell_ms = 1500

[[trigger.bindings]]
name = "blue"
red = [0, 60]
green = [0, 90]
blue = [120, 255]
action = "stop"

[mapper]
gain = 2.5
bands = [[0, 499, -5.0], { min = 500, max = 1023, rate = 5.0 }]

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.hub.color_sensor_port, 0x13);
    assert_eq!(cfg.hub.sensor_mode, SensorMode::ColorIndex);
    assert_eq!(cfg.trigger.bindings[0].action, BindingAction::Stop);
    assert_eq!(cfg.trigger.bindings[0].blue, (120, 255));
    assert_eq!(cfg.trigger.cooldown_ms, 3000);
    assert_eq!(cfg.mapper.bands.len(), 2);
    assert_eq!(cfg.mapper.bands[1].min, 500);
    assert!((cfg.mapper.bands[0].rate + 5.0).abs() < f64::EPSILON);
}

#[rstest]
#[case("[hub]\nmax_power = 120", "max_power")]
#[case("[hub]\nestop_ports = []", "estop_ports")]
#[case("[stabilizer]\nthreshold = 6\ncapacity = 5", "threshold")]
#[case("[stabilizer]\ncapacity = 0", "capacity")]
#[case("[mapper]\ntick_ms = 0", "tick_ms")]
#[case("[mapper]\nmin_magnitude = 60\nmax_magnitude = 40", "magnitudes")]
#[case("[mapper]\nbands = [[0, 500, 1.0], [400, 1023, 2.0]]", "overlap")]
#[case("[mapper]\nbands = [[10, 5, 1.0]]", "min > max")]
#[case("[dispatcher]\nnormal_wait_ms = 0", "normal_wait_ms")]
#[case("[logging]\nrotation = \"weekly\"", "rotation")]
#[case(
    "[[trigger.bindings]]\nname = \"x\"\nred = [200, 100]\ngreen = [0, 1]\nblue = [0, 1]",
    "red band"
)]
#[case("[trigger]\nbindings = []", "at least one")]
fn rejects_invalid(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "error {err} should mention {needle}"
    );
}

#[test]
fn unknown_enum_value_is_a_parse_error() {
    assert!(load_toml("[hub]\nsensor_mode = \"hsv\"").is_err());
    assert!(
        load_toml(
            "[[trigger.bindings]]\nname = \"r\"\nred = [0, 1]\ngreen = [0, 1]\nblue = [0, 1]\naction = \"explode\""
        )
        .is_err()
    );
}

#[test]
fn load_reports_missing_file() {
    let err = Config::load(std::path::Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(format!("{err}").contains("read config"));
}
