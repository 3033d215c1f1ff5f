//! Robot functions the reasoning model may call.
//!
//! Sent as the `functionDeclarations` of the request's single tool.  Schema
//! types use the API's upper-case names.

use serde::Serialize;
use serde_json::{json, Value};

pub const BEEP: &str = "beep";
pub const MOVE_ARM: &str = "move_arm";
pub const CONTROL_GRIPPER: &str = "control_gripper";
pub const NEXT_MODE: &str = "next_mode";
pub const SET_TARGET: &str = "set_target";
pub const INCREASE_SPEED: &str = "increase_speed_coefficient";
pub const DECREASE_SPEED: &str = "decrease_speed_coefficient";
pub const SET_MOVEMENT_WITH_DURATION: &str = "set_movement_with_duration";

/// Targets the on-board detector knows.
pub const TARGETS: [&str; 3] = ["person", "cat", "orange"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn axis(description: &str) -> Value {
    json!({ "type": "NUMBER", "description": description, "minimum": -1, "maximum": 1 })
}

fn no_parameters() -> Value {
    json!({ "type": "OBJECT", "properties": {}, "required": [] })
}

/// Every function the robot understands.
pub fn robot_functions() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: BEEP,
            description: "Makes the robot emit a beeping sound for a specified duration.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "seconds": {
                        "type": "NUMBER",
                        "description": "The duration of the beep in seconds.",
                        "minimum": 0,
                        "maximum": 5
                    }
                },
                "required": ["seconds"]
            }),
        },
        FunctionDeclaration {
            name: MOVE_ARM,
            description: "Moves the point of the arm (gripper) along the specified axes.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "x_axis": axis("Movement along the X-axis (left/right)."),
                    "y_axis": axis("Movement along the Y-axis (forward/backward)."),
                    "z_axis": axis("Movement along the Z-axis (up/down).")
                },
                "required": []
            }),
        },
        FunctionDeclaration {
            name: CONTROL_GRIPPER,
            description: "Controls the rotation of the gripper and its open/close state.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "rotation": {
                        "type": "INTEGER",
                        "description": "The rotation angle of the gripper.",
                        "minimum": 0,
                        "maximum": 180
                    },
                    "opening": {
                        "type": "BOOLEAN",
                        "description": "Whether to open (true) or close (false) the gripper."
                    }
                },
                "required": []
            }),
        },
        FunctionDeclaration {
            name: NEXT_MODE,
            description: "Switches the robot to the next main operating mode in its predefined sequence.",
            parameters: no_parameters(),
        },
        FunctionDeclaration {
            name: SET_TARGET,
            description: "Set a target for the robot from a predefined list. The robot will use an \
                          object detection model to find this target.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "target": {
                        "type": "STRING",
                        "enum": TARGETS,
                        "description": "The target to set for the robot."
                    }
                },
                "required": ["target"]
            }),
        },
        FunctionDeclaration {
            name: INCREASE_SPEED,
            description: "Slightly increases the robot's speed coefficient. This affects all \
                          movements and increases the maximum allowed speed.",
            parameters: no_parameters(),
        },
        FunctionDeclaration {
            name: DECREASE_SPEED,
            description: "Slightly decreases the robot's speed coefficient. This affects all \
                          movements and decreases the maximum allowed speed.",
            parameters: no_parameters(),
        },
        FunctionDeclaration {
            name: SET_MOVEMENT_WITH_DURATION,
            description: "Sets the speed for the robot along the X (forward/backward), Y (left/right \
                          translation), and Z (rotation) axes. The movement stops automatically \
                          after the specified duration.",
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "duration": {
                        "type": "NUMBER",
                        "description": "The duration of the movement in seconds.",
                        "minimum": 0.1,
                        "maximum": 5
                    },
                    "speed_x": axis("Forward (positive) or backward (negative) in the facing direction."),
                    "speed_y": axis("Right (positive) or left (negative) translation without rotating."),
                    "speed_z": axis("Rotation; positive turns right, negative turns left.")
                },
                "required": ["duration"]
            }),
        },
    ]
}

/// `true` if `name` is one of [`robot_functions`].
pub fn is_declared(name: &str) -> bool {
    robot_functions().iter().any(|f| f.name == name)
}

/// The `tools` array of a reasoning request.
pub fn tools() -> Value {
    json!([{ "functionDeclarations": robot_functions() }])
}
