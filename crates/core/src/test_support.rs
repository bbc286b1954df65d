// SPDX-License-Identifier: MIT

//! `proptest` strategies shared by this crate's own tests and by downstream
//! crates' (`zallet-dag`'s `validate` properties) under the `test-support`
//! feature.

pub mod strategies {
    use proptest::prelude::*;

    use crate::task::RunStatus;

    pub fn arb_run_status() -> impl Strategy<Value = RunStatus> {
        prop_oneof![
            Just(RunStatus::Running),
            Just(RunStatus::Success),
            Just(RunStatus::Fail),
            Just(RunStatus::Cancelled),
            Just(RunStatus::Timeout),
        ]
    }
}
