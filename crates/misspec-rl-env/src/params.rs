//! Parameter bundles handed to environment builders
//!
//! These mirror the simulation/environment/network/vehicle parameter
//! groups of a traffic experiment. The layer only copies and forwards them;
//! their meaning belongs to the environment builder.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use misspec_rl_core::{Environment, Result};

/// Extra collaborator-specific fields
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Simulation step length in seconds
    pub sim_step: f64,
    /// Open a GUI while simulating
    pub render: bool,
    /// Simulator seed
    pub seed: Option<u64>,
    /// Restart the simulator process on every reset
    pub restart_instance: bool,
    /// Where to write emission files
    pub emission_path: Option<PathBuf>,
    /// Simulator-specific settings
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            sim_step: 0.1,
            render: false,
            seed: None,
            restart_instance: false,
            emission_path: None,
            extra: Extra::new(),
        }
    }
}

/// Environment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvParams {
    /// Steps per rollout
    pub horizon: usize,
    /// Steps simulated before the agent acts
    pub warmup_steps: usize,
    /// Simulator steps per environment step
    pub sims_per_step: usize,
    /// Clip actions to the action space
    pub clip_actions: bool,
    /// Environment-specific settings
    #[serde(flatten)]
    pub additional_params: Extra,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            horizon: 500,
            warmup_steps: 0,
            sims_per_step: 1,
            clip_actions: true,
            additional_params: Extra::new(),
        }
    }
}

impl EnvParams {
    /// Numeric entry of `additional_params`
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.additional_params.get(key).and_then(serde_json::Value::as_f64)
    }
}

/// Network parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Network template file
    pub template: Option<PathBuf>,
    /// Topology-specific settings
    #[serde(flatten)]
    pub additional_params: Extra,
}

impl NetParams {
    /// Numeric entry of `additional_params`
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.additional_params.get(key).and_then(serde_json::Value::as_f64)
    }
}

/// One vehicle type placed in the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
    /// Type identifier
    pub veh_id: String,
    /// How many vehicles of this type
    pub num_vehicles: usize,
    /// Name of the acceleration controller class
    pub acceleration_controller: String,
    /// Controller-specific settings
    #[serde(flatten)]
    pub extra: Extra,
}

/// Vehicles present at the start of a rollout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Vehicle types in insertion order
    pub types: Vec<VehicleType>,
}

impl VehicleParams {
    /// Add a vehicle type
    pub fn add(
        &mut self,
        veh_id: impl Into<String>,
        acceleration_controller: impl Into<String>,
        num_vehicles: usize,
    ) {
        self.types.push(VehicleType {
            veh_id: veh_id.into(),
            num_vehicles,
            acceleration_controller: acceleration_controller.into(),
            extra: Extra::new(),
        });
    }

    /// Total number of vehicles across types
    #[must_use]
    pub fn num_vehicles(&self) -> usize {
        self.types.iter().map(|t| t.num_vehicles).sum()
    }
}

/// Initial vehicle placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConfig {
    /// Shuffle vehicle order on reset
    pub shuffle: bool,
    /// Placement scheme
    pub spacing: String,
    /// Random position perturbation
    pub perturbation: f64,
    /// Road length left empty
    pub bunching: f64,
}

impl Default for InitialConfig {
    fn default() -> Self {
        Self {
            shuffle: false,
            spacing: "uniform".to_string(),
            perturbation: 0.0,
            bunching: 0.0,
        }
    }
}

/// Traffic light programs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficLightParams {
    /// Use the simulator's baseline actuated programs
    pub baseline: bool,
    /// Per-node programs
    #[serde(flatten)]
    pub programs: Extra,
}

/// Complete parameter bundle of one experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    /// Experiment name; also the network's name
    pub exp_tag: String,
    /// Simulator backend name
    pub simulator: String,
    /// Network class name
    pub network: String,
    /// Simulation parameters
    #[serde(default)]
    pub sim: SimParams,
    /// Environment parameters
    #[serde(default)]
    pub env: EnvParams,
    /// Network parameters
    #[serde(default)]
    pub net: NetParams,
    /// Vehicles
    #[serde(default)]
    pub veh: VehicleParams,
    /// Initial placement
    #[serde(default)]
    pub initial: InitialConfig,
    /// Traffic lights
    #[serde(default)]
    pub tls: TrafficLightParams,
}

impl FlowParams {
    /// Bundle with default parameter groups
    pub fn new(
        exp_tag: impl Into<String>,
        simulator: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            exp_tag: exp_tag.into(),
            simulator: simulator.into(),
            network: network.into(),
            sim: SimParams::default(),
            env: EnvParams::default(),
            net: NetParams::default(),
            veh: VehicleParams::default(),
            initial: InitialConfig::default(),
            tls: TrafficLightParams::default(),
        }
    }
}

/// Network description passed to the environment builder
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    /// Network name (the experiment tag)
    pub name: String,
    /// Network class name
    pub class: String,
    /// Vehicles placed in the network
    pub vehicles: VehicleParams,
    /// Network parameters
    pub net_params: NetParams,
    /// Initial placement
    pub initial_config: InitialConfig,
    /// Traffic lights
    pub traffic_lights: TrafficLightParams,
}

impl Network {
    /// Build the network from `params`, taking ownership of a vehicle copy
    #[must_use]
    pub fn from_params(params: &FlowParams, vehicles: VehicleParams) -> Self {
        Self {
            name: params.exp_tag.clone(),
            class: params.network.clone(),
            vehicles,
            net_params: params.net.clone(),
            initial_config: params.initial.clone(),
            traffic_lights: params.tls.clone(),
        }
    }
}

/// Inputs for one environment instantiation
#[derive(Debug, Clone)]
pub struct EnvInputs {
    /// Environment parameters
    pub env_params: EnvParams,
    /// Simulation parameters (already a private copy)
    pub sim_params: SimParams,
    /// Network built for this instance
    pub network: Network,
    /// Simulator backend name
    pub simulator: String,
}

/// Constructor for a concrete environment class
///
/// Stands in for the environment class named in the experiment: its
/// [`EnvBuilder::env_name`] is the base of registry identifiers.
pub trait EnvBuilder: Send + Sync + 'static {
    /// Environment produced by this builder
    type Env: Environment + 'static;

    /// Declared environment class name
    fn env_name(&self) -> &str;

    /// Build a fresh environment
    fn build(&self, inputs: EnvInputs) -> Result<Self::Env>;
}
