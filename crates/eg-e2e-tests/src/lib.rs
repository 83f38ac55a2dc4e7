//! End-to-end tests for `eg-mqtt-session`.
//!
//! The tests live under `tests/` and drive a real `Session` against a small
//! MQTT v5 broker stub that listens on a loopback TCP port.
