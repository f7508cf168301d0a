//! Environment registry: collision-free ids and zero-argument factories

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use misspec_rl_core::{RLError, Result};

use crate::config::ExperimentConfig;
use crate::params::{EnvBuilder, EnvInputs, FlowParams, Network};
use crate::reward_registry::RewardRegistry;
use crate::wrappers::ProxyRewardWrapper;

/// Zero-argument constructor handed back by [`EnvRegistry::create`]
pub type EnvFactory<W> = Arc<dyn Fn() -> Result<W> + Send + Sync>;

type BoxedConstructor<W> = Box<dyn Fn() -> Result<W> + Send + Sync>;

/// Exclusive upper bound of the random id suffix
const SUFFIX_BOUND: u32 = 1 << 31;

lazy_static::lazy_static! {
    static ref GLOBAL: Arc<EnvRegistry> = Arc::new(EnvRegistry::new());
}

/// Metadata kept for every registered environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSpec {
    /// Unique identifier, e.g. `RingRoadEnv-v01804289383`
    pub id: String,
    /// What the constructor builds
    pub entry_point: String,
    /// Horizon of the registered environment, if known
    pub max_episode_steps: Option<usize>,
}

impl EnvSpec {
    /// Spec with only an id and entry point
    pub fn new(id: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_point: entry_point.into(),
            max_episode_steps: None,
        }
    }
}

struct RegisteredEnv {
    spec: EnvSpec,
    /// `BoxedConstructor<W>` behind `Any`
    constructor: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct RegistryState {
    /// Every id ever handed out or registered
    issued: HashSet<String>,
    entries: HashMap<String, RegisteredEnv>,
}

/// Append-only store of environment identifiers and constructors
///
/// Ids are unique over the registry's whole history. All check-then-act
/// sequences run under one mutex, so concurrent [`EnvRegistry::create`]
/// calls never observe the same id.
pub struct EnvRegistry {
    state: Mutex<RegistryState>,
}

impl EnvRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Process-wide registry, created on first use
    #[must_use]
    pub fn global() -> Arc<EnvRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn state(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| RLError::Environment("environment registry lock poisoned".into()))
    }

    /// Mint a fresh id `"{base_name}-v{version}{suffix}"` and reserve it.
    ///
    /// The version is bumped past every exact `{base_name}-v{version}` already
    /// issued; the suffix comes from an RNG reseeded from wall-clock time and
    /// is redrawn until the full id is unused.
    pub fn reserve_id(&self, base_name: &str, version: u32) -> Result<String> {
        let mut state = self.state()?;

        let mut version = version;
        while state.issued.contains(&format!("{base_name}-v{version}")) {
            version += 1;
        }
        let prefix = format!("{base_name}-v{version}");

        let mut rng = StdRng::seed_from_u64(wall_clock_seed());
        let id = loop {
            let candidate = format!("{prefix}{}", rng.gen_range(0..SUFFIX_BOUND));
            if !state.issued.contains(&candidate) {
                break candidate;
            }
            debug!(%candidate, "environment id collision, redrawing suffix");
        };

        state.issued.insert(id.clone());
        info!(%id, "reserved environment id");
        Ok(id)
    }

    /// Register a constructor under a new id.
    ///
    /// Fails with [`RLError::RegistrationConflict`] if the id was ever
    /// issued or registered before; nothing is overwritten.
    pub fn register<W, F>(&self, spec: EnvSpec, constructor: F) -> Result<()>
    where
        W: 'static,
        F: Fn() -> Result<W> + Send + Sync + 'static,
    {
        let mut state = self.state()?;
        if !state.issued.insert(spec.id.clone()) {
            return Err(RLError::RegistrationConflict { id: spec.id });
        }
        Self::insert_entry(&mut state, spec, constructor);
        Ok(())
    }

    /// Register a constructor under an id obtained from [`EnvRegistry::reserve_id`]
    fn register_reserved<W, F>(&self, spec: EnvSpec, constructor: F) -> Result<()>
    where
        W: 'static,
        F: Fn() -> Result<W> + Send + Sync + 'static,
    {
        let mut state = self.state()?;
        if state.entries.contains_key(&spec.id) {
            return Err(RLError::RegistrationConflict { id: spec.id });
        }
        if !state.issued.contains(&spec.id) {
            return Err(RLError::Environment(format!(
                "environment id was never reserved: {}",
                spec.id
            )));
        }
        Self::insert_entry(&mut state, spec, constructor);
        Ok(())
    }

    fn insert_entry<W, F>(state: &mut RegistryState, spec: EnvSpec, constructor: F)
    where
        W: 'static,
        F: Fn() -> Result<W> + Send + Sync + 'static,
    {
        let boxed: BoxedConstructor<W> = Box::new(constructor);
        info!(id = %spec.id, entry_point = %spec.entry_point, "registered environment");
        state.entries.insert(
            spec.id.clone(),
            RegisteredEnv {
                spec,
                constructor: Arc::new(boxed),
            },
        );
    }

    /// Build a fresh environment registered under `id`
    pub fn make<W: 'static>(&self, id: &str) -> Result<W> {
        let constructor = {
            let state = self.state()?;
            let entry = state
                .entries
                .get(id)
                .ok_or_else(|| RLError::Environment(format!("Unknown environment: {id}")))?;
            Arc::clone(&entry.constructor)
        };

        let constructor = constructor.downcast::<BoxedConstructor<W>>().map_err(|_| {
            RLError::Environment(format!(
                "environment {id} does not build a {}",
                std::any::type_name::<W>()
            ))
        })?;

        debug!(%id, "making environment");
        constructor()
    }

    /// Metadata of a registered environment
    pub fn spec(&self, id: &str) -> Result<Option<EnvSpec>> {
        let state = self.state()?;
        Ok(state.entries.get(id).map(|entry| entry.spec.clone()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.state()?.entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.state()?.entries.contains_key(id))
    }

    /// Number of registered environments
    pub fn len(&self) -> Result<usize> {
        Ok(self.state()?.entries.len())
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Mint an id for `builder`'s environment class and return a factory for it.
    ///
    /// The factory registers the id on its first call, with the
    /// [`ProxyRewardWrapper`] construction bound as entry point, and builds a
    /// fresh wrapped environment on every call. Each build works on private
    /// copies of the simulation and vehicle parameters.
    pub fn create<B: EnvBuilder>(
        self: &Arc<Self>,
        params: FlowParams,
        builder: B,
        rewards: Arc<RewardRegistry<B::Env>>,
        experiment: ExperimentConfig,
    ) -> Result<(EnvFactory<ProxyRewardWrapper<B::Env>>, String)> {
        experiment.wrapper.validate()?;
        if let Some(spec) = &experiment.reward_specification {
            spec.validate(&rewards)?;
        }

        let base_name = builder.env_name().to_string();
        let id = self.reserve_id(&base_name, experiment.version)?;

        let spec = EnvSpec {
            id: id.clone(),
            entry_point: format!("ProxyRewardWrapper<{base_name}>"),
            max_episode_steps: Some(params.env.horizon),
        };
        let builder = Arc::new(builder);
        let entry_point: EnvFactory<ProxyRewardWrapper<B::Env>> = Arc::new(move || {
            let sim_params = {
                let mut sim = params.sim.clone();
                sim.render = experiment.render.unwrap_or(false) || sim.render;
                sim
            };
            let network = Network::from_params(&params, params.veh.clone());
            let env = builder.build(EnvInputs {
                env_params: params.env.clone(),
                sim_params,
                network,
                simulator: params.simulator.clone(),
            })?;

            ProxyRewardWrapper::new(
                env,
                experiment.reward_specification.clone(),
                &rewards,
                &experiment.wrapper,
            )
        });

        let registry = Arc::clone(self);
        let registered = Mutex::new(false);
        let factory_id = id.clone();
        let factory: EnvFactory<ProxyRewardWrapper<B::Env>> = Arc::new(move || {
            {
                let mut done = registered
                    .lock()
                    .map_err(|_| RLError::Environment("factory lock poisoned".into()))?;
                if !*done {
                    let entry_point = Arc::clone(&entry_point);
                    registry.register_reserved(spec.clone(), move || entry_point())?;
                    *done = true;
                }
            }
            registry.make::<ProxyRewardWrapper<B::Env>>(&factory_id)
        });

        Ok((factory, id))
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Like [`EnvRegistry::create`], keeping only the factory
pub fn env_constructor<B: EnvBuilder>(
    registry: &Arc<EnvRegistry>,
    params: FlowParams,
    builder: B,
    rewards: Arc<RewardRegistry<B::Env>>,
    experiment: ExperimentConfig,
) -> Result<EnvFactory<ProxyRewardWrapper<B::Env>>> {
    registry
        .create(params, builder, rewards, experiment)
        .map(|(factory, _)| factory)
}

#[allow(clippy::cast_possible_truncation)]
fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
