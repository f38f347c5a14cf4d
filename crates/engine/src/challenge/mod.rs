mod aggregator;
mod command;
mod config;
mod controller;
mod events;
mod host;
mod integrity;
mod option_pool;
mod rng;
mod sequencer;
mod threat_clock;

pub use aggregator::{
    AggregatorError, ReportOutcome, SubsystemAggregator, SubsystemId, SubsystemRecord,
};
pub use command::{
    Command, CommandId, OptionSet, OptionSetSerial, Step, DECOYS_PER_SET,
    DEFAULT_COMMAND_CATEGORY, OPTIONS_PER_SET,
};
pub use config::{
    AttackSchedule, ChallengeConfig, ConfigError, DEFAULT_CHALLENGE_NAME, DEFAULT_MAX_CORRUPTION,
    DEFAULT_REWARD_MS, DEFAULT_THRESHOLD_MS,
};
pub use controller::{
    ChallengeController, ChallengeSession, ChallengeState, IgnoredSubmit, SessionSnapshot,
    SubmitOutcome, SubmitResult, TickOutcome,
};
pub use events::{ChallengeEvent, ChallengeEventBus, ChallengeEventCounts, ChallengeEventKind};
pub use host::{
    AggregatorHandle, ChallengeHost, HostError, HostEvent, HostEventSource, PresentOutcome,
    RestartOutcome, SessionHandle, SessionStarted,
};
pub use integrity::{IntegrityMeter, IntegrityStatus, IntegrityTier};
pub use option_pool::{OptionPool, OptionPoolError};
pub use rng::{derive_session_seed, ChallengeRng};
pub use sequencer::{Cursor, StepSequencer, Submission};
pub use threat_clock::{ThreatClock, ThreatState};
