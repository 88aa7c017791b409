//! lambdalet: warm-worker invocation proxy supervisor for serverless functions.
//!
//! A long-lived parent keeps a single worker process warm across serverless
//! invocations, forwards each event to it over a loopback binary-protocol
//! channel, and respawns it on failure within a bounded budget before
//! fail-fasting the whole container.
//!
//! The invocation source is assumed to serialize calls (at most one in-flight
//! invocation per supervisor); concurrent callers are queued, never dropped.

mod context;
mod handshake;
mod metrics;
mod supervisor;

pub mod bridge;

pub use bridge::client::{
    ExchangeTimings, ProxyClient, ProxyError, ResponsePayload, WorkerFailure,
};
pub use bridge::codec::{coerce_body, encode_request};
pub use context::{ClientContext, ClientContextEnv, CognitoIdentity, LambdaContext};
pub use handshake::{READY_SIGNAL, ReadySignal};
pub use metrics::{
    Dimension, HttpSink, LifecycleEvent, MetricDatum, MetricSample, MetricsSink, Reporter,
    TracingSink, Unit,
};
pub use supervisor::{
    ExecSpawner, FatalExit, InvocationError, MAX_CONSECUTIVE_FAILURES, ProcessExit, SpawnError,
    Supervisor, SupervisorConfig, WorkerSpawner,
};
