//! Slurm cluster adapter: implements the cluster ports on top of a
//! `RemoteShell` using the scripts rendered in `crate::domain`.
//!
//! Non-idempotent scripts (submission, backend launch) go through
//! `run_once`; polling reads go through `probe`; everything else retries.

use anyhow::{Context, Result};

use crate::application::ports::{
    NodeRuntime, PreferenceStore, RemoteShell, Scheduler, SessionStore,
};
use crate::domain::launch::{LaunchPlan, presence_script};
use crate::domain::prefs::Preferences;
use crate::domain::scheduler::{
    CANCEL_USER_JOBS, KILL_ALLOCATION_CLIENTS, parse_squeue, squeue_script, submit_script,
};
use crate::domain::{JobName, JobStatus, SessionRequest, StateKey, StateLayout};

pub struct SlurmCluster<S> {
    shell: S,
    layout: StateLayout,
}

impl<S: RemoteShell> SlurmCluster<S> {
    #[must_use]
    pub fn new(shell: S, remote_root: &str) -> Self {
        Self {
            shell,
            layout: StateLayout::new(remote_root),
        }
    }
}

fn non_empty(output: &str) -> Option<String> {
    let value = output.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl<S: RemoteShell> Scheduler for SlurmCluster<S> {
    async fn submit(&self, request: &SessionRequest, job_name: &JobName) -> Result<()> {
        let script = submit_script(&self.layout, request, job_name);
        let out = self
            .shell
            .run_once(&script)
            .await
            .context("submitting allocation")?;
        anyhow::ensure!(
            out.contains("submitted"),
            "allocation submission printed no confirmation"
        );
        Ok(())
    }

    async fn query(&self, job_name: &JobName) -> Result<Option<JobStatus>> {
        let out = self.shell.probe(&squeue_script(job_name)).await?;
        Ok(parse_squeue(&out))
    }

    async fn cancel_user_jobs(&self) -> Result<()> {
        self.shell.run(CANCEL_USER_JOBS).await.map(drop)
    }

    async fn kill_allocation_clients(&self) -> Result<()> {
        self.shell.run(KILL_ALLOCATION_CLIENTS).await.map(drop)
    }
}

impl<S: RemoteShell> SessionStore for SlurmCluster<S> {
    async fn read(&self, key: StateKey) -> Result<Option<String>> {
        let out = self.shell.run(&self.layout.read_script(key)).await?;
        Ok(non_empty(&out))
    }

    async fn poll(&self, key: StateKey) -> Result<Option<String>> {
        let out = self.shell.probe(&self.layout.read_script(key)).await?;
        Ok(non_empty(&out))
    }

    async fn write(&self, key: StateKey, value: &str) -> Result<()> {
        self.shell
            .run(&self.layout.write_script(key, value))
            .await
            .with_context(|| format!("writing {}", key.file_name()))
            .map(drop)
    }

    async fn tail(&self, key: StateKey, lines: usize) -> Result<String> {
        let out = self.shell.run(&self.layout.tail_script(key, lines)).await?;
        Ok(out.trim_end().to_string())
    }

    async fn reset(&self) -> Result<()> {
        self.shell
            .run(&self.layout.reset_script())
            .await
            .context("resetting remote state directory")
            .map(drop)
    }
}

impl<S: RemoteShell> NodeRuntime for SlurmCluster<S> {
    async fn backend_present(&self, node: &str, path: &str) -> Result<bool> {
        let out = self.shell.run(&presence_script(node, path)).await?;
        match out.trim() {
            "present" => Ok(true),
            "missing" => Ok(false),
            other => anyhow::bail!("unexpected presence check output: {other:?}"),
        }
    }

    async fn launch(&self, plan: &LaunchPlan) -> Result<()> {
        let out = self
            .shell
            .run_once(&plan.launch_script(&self.layout))
            .await
            .with_context(|| format!("launching backend on {}", plan.node))?;
        anyhow::ensure!(
            out.contains("launched"),
            "backend launch printed no confirmation"
        );
        Ok(())
    }
}

impl<S: RemoteShell> PreferenceStore for SlurmCluster<S> {
    async fn load(&self) -> Result<Preferences> {
        let out = self
            .shell
            .run(&self.layout.prefs_read_script())
            .await
            .context("reading preferences")?;
        Ok(Preferences::parse(&out))
    }

    async fn save(&self, prefs: &Preferences) -> Result<()> {
        self.shell
            .run(&self.layout.prefs_write_script(&prefs.render()))
            .await
            .context("saving preferences")
            .map(drop)
    }
}
