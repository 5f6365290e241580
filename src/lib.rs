//! Timer-triggered three-channel analog capture for an [RP2040](rp2040_hal) EV charging
//! test fixture.
//!
//! Three independent trigger timers each start a conversion on one analog input (mains sense,
//! controller-side pilot, terminal-side pilot). Every completion interrupt appends its sample to
//! the channel's ring buffer and raises a fill signal on wrap-around. The mainline
//! [`Supervisor`](supervisor::Supervisor) waits until all three channels have filled before it
//! releases a capture cycle, so a fast channel never cuts short a slow one. While waiting, the
//! completion handlers keep overwriting the oldest samples of any channel that is already full.
//!
//! The core ([`engine`], [`buffer`], [`supervisor`]) is hardware agnostic: it talks to triggers
//! through [`trigger::TriggerBank`] and to converters through
//! [`conversion::ConversionResult`]. [`components`] implements those for the RP2040, and the
//! `sim` module implements them for host tests.
//!
//! ## Crate features
//!
//! - `rp2040`: Board support in [`components`] and the firmware binary. Implies `defmt`.
//! - `defmt`: Log through [`defmt`](https://docs.rs/defmt).
//! - `log`: Log through the [`log`](https://docs.rs/log) facade, for hosted builds.
//! - `sim`: Exposes the simulated triggers and converter outside of unit tests.
//! - `trace_overflow`: Logs every conversion result that was overwritten before its completion
//!   handler ran. See [`engine::AcquisitionEngine::complete`].
//! - `trace_cycle_samples`: Logs the first samples of every channel on each completed cycle.
//!
//! <div class="warning">Features <code>defmt</code> and <code>log</code> are mutually
//! exclusive.</div>
//!
//! ## Demo
//!
//! Handlers and supervisor share one engine. Here the handler runs inline:
//!
//! ```
//! use triggered_capture::{
//!     channel::ChannelId,
//!     conversion::ResultRegister,
//!     engine::AcquisitionEngine,
//! };
//!
//! static ENGINE: AcquisitionEngine<2> = AcquisitionEngine::new();
//! let result = ResultRegister::new();
//!
//! for id in ChannelId::ALL {
//!     for raw in [100, 200] {
//!         result.deposit(raw);
//!         ENGINE.complete(id, &result);
//!     }
//! }
//!
//! assert!(ENGINE.all_full());
//! assert_eq!(ENGINE.snapshot(ChannelId::Pilot), [100, 200]);
//! assert!(ENGINE.try_release());
//! assert_eq!(ENGINE.fill_signals(), [false; 3]);
//! ```

// Copyright 2024 Cameron Rodriguez
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg), feature(doc_cfg_hide))]

#[macro_use]
mod fmt;

pub mod buffer;
pub mod channel;
pub mod components;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod interrupt;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod supervisor;
pub mod trigger;
