use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{Event, ExitCode};
use std::sync::atomic::Ordering;


/// Drain every event currently buffered on a receiver
fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
