// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Concurrency tests for the reservation engine.
//!
//! The overbooking race is the failure mode a single-writer design avoids
//! by construction: two concurrent reserves both passing the capacity
//! check. These tests hammer that path and use parking_lot's
//! deadlock detector to verify the engine's locking patterns stay
//! cycle-free under concurrent access.

use chrono::NaiveDate;
use parking_lot::deadlock;
use reserva_rs::{
    Engine, ExperienceConfig, ExperienceId, Guest, MemoryStore, ReservationError, UserId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn config(id: u32, max_seats: u32, horizon: usize) -> ExperienceConfig {
    ExperienceConfig {
        id: ExperienceId(id),
        title: format!("Experience {id}"),
        description: None,
        max_seats,
        reference_date: date(6),
        horizon,
    }
}

fn guest(user: u32) -> Guest {
    Guest {
        user_id: UserId(user),
        user_name: format!("user {user}"),
        user_avatar: None,
    }
}

/// Spawns a watcher that records whether any deadlock appears while the
/// test body runs.
fn with_deadlock_watch<F: FnOnce()>(body: F) {
    let deadlocked = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));

    let watcher = {
        let deadlocked = Arc::clone(&deadlocked);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if !deadlock::check_deadlock().is_empty() {
                    deadlocked.store(true, Ordering::SeqCst);
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
        })
    };

    body();

    stop.store(true, Ordering::SeqCst);
    watcher.join().unwrap();
    assert!(!deadlocked.load(Ordering::SeqCst), "deadlock detected");
}

fn assert_ledger_consistent(engine: &Engine, max_seats: u32) {
    for record in engine.records() {
        for slot in &record.dates {
            let sum: u32 = slot.reservations.iter().map(|r| r.seats).sum();
            assert_eq!(slot.reserved_seats, sum, "counter diverged from entries");
            assert!(slot.reserved_seats <= max_seats, "slot overbooked");
        }
    }
}

#[test]
fn concurrent_reserves_never_overbook_a_slot() {
    with_deadlock_watch(|| {
        let engine = Arc::new(Engine::new());
        engine.register(&config(1, 10, 1)).unwrap();

        let accepted_seats = Arc::new(AtomicU32::new(0));

        // 20 users race for 3 seats each; only 3 requests can fit.
        let handles: Vec<_> = (1..=20u32)
            .map(|user| {
                let engine = Arc::clone(&engine);
                let accepted_seats = Arc::clone(&accepted_seats);
                thread::spawn(move || {
                    match engine.reserve(ExperienceId(1), &guest(user), 3, None) {
                        Ok(_) => {
                            accepted_seats.fetch_add(3, Ordering::SeqCst);
                        }
                        Err(
                            ReservationError::CapacityExceeded { .. }
                            | ReservationError::NoAvailableDate,
                        ) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = accepted_seats.load(Ordering::SeqCst);
        assert!(total <= 10, "accepted {total} seats into a 10 seat slot");
        assert_eq!(total, 9, "expected exactly three 3-seat acceptances");

        let view = engine.snapshot(ExperienceId(1), Some(date(6))).unwrap();
        assert_eq!(view.slot.unwrap().reserved_seats, total);
        assert_ledger_consistent(&engine, 10);
    });
}

#[test]
fn concurrent_reserve_and_cancel_keep_the_ledger_consistent() {
    with_deadlock_watch(|| {
        let engine = Arc::new(Engine::new());
        engine.register(&config(1, 50, 4)).unwrap();

        let handles: Vec<_> = (1..=16u32)
            .map(|user| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = engine.reserve(ExperienceId(1), &guest(user), 2, None);
                        let _ = engine.cancel(ExperienceId(1), UserId(user), None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_ledger_consistent(&engine, 50);

        // Every thread's last operation was a cancel of its only
        // reservation, so the ledger must be empty again.
        assert_eq!(engine.active_reservations(), 0);
        let view = engine.snapshot(ExperienceId(1), Some(date(6))).unwrap();
        assert_eq!(view.slot.unwrap().reserved_seats, 0);
    });
}

#[test]
fn experiences_do_not_block_each_other() {
    with_deadlock_watch(|| {
        let engine = Arc::new(Engine::new());
        for id in 1..=8u32 {
            engine.register(&config(id, 30, 2)).unwrap();
        }

        let handles: Vec<_> = (1..=8u32)
            .map(|id| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for user in 1..=30u32 {
                        let _ = engine.reserve(ExperienceId(id), &guest(user), 1, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in 1..=8u32 {
            let view = engine.snapshot(ExperienceId(id), Some(date(6))).unwrap();
            assert_eq!(view.slot.unwrap().reserved_seats, 30);
        }
        assert_eq!(engine.active_reservations(), 8 * 30);
        assert_ledger_consistent(&engine, 30);
    });
}

#[test]
fn concurrent_reads_during_writes_see_consistent_slots() {
    with_deadlock_watch(|| {
        let engine = Arc::new(Engine::new());
        engine.register(&config(1, 20, 2)).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let engine = Arc::clone(&engine);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    if let Ok(view) = engine.snapshot(ExperienceId(1), Some(date(6))) {
                        let slot = view.slot.unwrap();
                        let sum: u32 = slot.reservations.iter().map(|r| r.seats).sum();
                        assert_eq!(slot.reserved_seats, sum);
                        assert!(slot.reserved_seats <= 20);
                    }
                }
            })
        };

        let writers: Vec<_> = (1..=10u32)
            .map(|user| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _ = engine.reserve(ExperienceId(1), &guest(user), 2, None);
                        let _ = engine.cancel(ExperienceId(1), UserId(user), None);
                    }
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }
        stop.store(true, Ordering::SeqCst);
        reader.join().unwrap();
    });
}

#[test]
fn persistence_does_not_introduce_lock_cycles() {
    with_deadlock_watch(|| {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::with_store(store).unwrap());
        for id in 1..=4u32 {
            engine.register(&config(id, 20, 2)).unwrap();
        }

        // Every accepted mutation snapshots all experiences for the save,
        // interleaved across threads working on different aggregates.
        let handles: Vec<_> = (1..=4u32)
            .map(|id| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for user in 1..=20u32 {
                        let _ = engine.reserve(ExperienceId(id), &guest(user), 1, None);
                    }
                    for user in 1..=10u32 {
                        let _ = engine.cancel(ExperienceId(id), UserId(user), None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_ledger_consistent(&engine, 20);
        assert_eq!(engine.active_reservations(), 4 * 10);
    });
}
