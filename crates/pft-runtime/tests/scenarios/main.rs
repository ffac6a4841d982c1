//! End-to-end scenarios: model classes are installed into a registry, their
//! testing types are generated, and the widened members are called through
//! capability interfaces

mod harness;

mod cross_reference;
mod indirect_dispatch;
mod loading;
mod round_trip;
