// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::MaterializedState;
use orc_core::{Event, Run, RunStatus, TaskRunStatus};

impl MaterializedState {
    pub(super) fn apply_run_event(&mut self, event: &Event) {
        match event {
            Event::RunCreated { run } => {
                if self.run_keys.contains_key(&run.idempotency_key) {
                    return;
                }
                self.run_keys.insert(run.idempotency_key.clone(), run.id.clone());
                self.runs.entry(run.id.clone()).or_insert_with(|| run.clone());
            }
            Event::RunStatusChanged { id, status, at_ms } => {
                if let Some(run) = self.runs.get_mut(id) {
                    set_status(run, *status, *at_ms);
                }
            }
            Event::RunTaskRecorded { id, index, task_run } => {
                if let Some(run) = self.runs.get_mut(id) {
                    if run.task_runs.len() == *index {
                        run.task_runs.push(task_run.clone());
                    }
                }
            }
            Event::RunTaskConfirmed { id, task_id, output, tx, at_ms } => {
                let Some(run) = self.runs.get_mut(id) else { return };
                let parked = run
                    .task_runs
                    .iter_mut()
                    .rev()
                    .find(|tr| &tr.task_id == task_id && tr.status == TaskRunStatus::Pending);
                if let Some(tr) = parked {
                    tr.status = TaskRunStatus::Completed;
                    tr.output = output.clone();
                    tr.confirmed_tx = Some(tx.clone());
                    tr.finished_at_ms = *at_ms;
                }
            }
            Event::RunErrored { id, error, at_ms } => {
                if let Some(run) = self.runs.get_mut(id) {
                    if !run.is_terminal() {
                        run.error = Some(error.clone());
                        set_status(run, RunStatus::Errored, *at_ms);
                    }
                }
            }
            _ => {}
        }
    }
}

fn set_status(run: &mut Run, status: RunStatus, at_ms: u64) {
    run.status = status;
    if status.is_terminal() && run.finished_at_ms.is_none() {
        run.finished_at_ms = Some(at_ms);
    }
}
