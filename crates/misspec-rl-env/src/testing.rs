//! Scripted environment shared by unit tests

use async_trait::async_trait;

use misspec_rl_core::{
    ActionSpace, BoxObservationSpace, ContinuousAction, ContinuousSpace, Environment,
    ObservationSpace, Result, Reward, Step, StepInfo, VectorObservation, CRASH_KEY,
};

use crate::reward_registry::RewardRegistry;

/// Environment whose reward inputs are set directly by the test
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    pub a: f64,
    pub b: f64,
    pub native: f64,
    pub crash: bool,
    pub sentinel_failure: bool,
    pub fallback: Option<ContinuousAction>,
    pub applied: Vec<ContinuousAction>,
    pub resets: usize,
    pub done_after: usize,
}

impl ScriptedEnv {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            a,
            b,
            native: 0.0,
            crash: false,
            sentinel_failure: false,
            fallback: None,
            applied: Vec::new(),
            resets: 0,
            done_after: usize::MAX,
        }
    }

    pub fn with_native(mut self, native: f64) -> Self {
        self.native = native;
        self
    }
}

#[async_trait]
impl Environment for ScriptedEnv {
    type Observation = VectorObservation;
    type Action = ContinuousAction;

    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
        Box::new(BoxObservationSpace::new(vec![-10.0, -10.0], vec![10.0, 10.0], vec![2]).unwrap())
    }

    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
        Box::new(ContinuousSpace::new(vec![-1.0], vec![1.0]).unwrap())
    }

    async fn reset(&mut self) -> Result<(Self::Observation, StepInfo)> {
        self.resets += 1;
        self.applied.clear();
        Ok((VectorObservation { data: vec![self.a, self.b] }, StepInfo::default()))
    }

    async fn step(&mut self, action: Self::Action) -> Result<Step<Self::Observation>> {
        let reward = self.compute_reward(&action, self.crash);
        self.applied.push(action);
        let done = self.applied.len() >= self.done_after;

        Ok(Step {
            observation: VectorObservation { data: vec![self.a, self.b] },
            reward,
            done,
            truncated: false,
            info: StepInfo::new().with(CRASH_KEY, self.crash),
        })
    }

    fn compute_reward(&self, _action: &Self::Action, _fail: bool) -> Reward {
        Reward(self.native)
    }

    fn fallback_action(&self) -> Option<Self::Action> {
        self.fallback.clone()
    }

    fn simulator_failed(&self) -> bool {
        self.sentinel_failure
    }
}

/// Registry with `a`, `b` and `first_action` terms
pub fn scripted_rewards() -> RewardRegistry<ScriptedEnv> {
    let mut registry = RewardRegistry::<ScriptedEnv>::new();
    registry
        .register("a", |env: &ScriptedEnv, _: &ContinuousAction| env.a)
        .unwrap();
    registry
        .register("b", |env: &ScriptedEnv, _: &ContinuousAction| env.b)
        .unwrap();
    registry
        .register("first_action", |_: &ScriptedEnv, action: &ContinuousAction| action.0[0])
        .unwrap();
    registry
}
