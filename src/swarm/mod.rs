//! Bounded multi-agent coder/reviewer/critic loop.
//!
//! `SwarmOrchestrator` runs role-specialized turns (coder, reviewer, critic,
//! and on-demand specialists) against a caller-supplied [`PhaseRunner`] —
//! the seam that, in production, is backed by a [`crate::brain::Brain`]
//! instance scoped to the phase's [`AgentProfile`]. Keeping that as a trait
//! rather than a hard dependency lets this loop's routing/compression logic
//! be exercised without spinning up a real provider.

use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;

use crate::ai::types::Message;
use crate::trace::{SpanKind, SpanStatus, TraceRecorder};
use crate::util::truncate_to;

const DEFAULT_MAX_ITERATIONS: usize = 3;
const FEEDBACK_COMPRESSION_THRESHOLD: usize = 3000;

// ─── AgentProfile ──────────────────────────────────────────────────────────

/// One of the seven fixed swarm roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentProfile {
    Coder,
    Reviewer,
    Critic,
    Planner,
    Tester,
    Researcher,
    Security,
}

/// What tool access a profile's Brain turn is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxAccess {
    ReadWrite,
    ReadOnly,
    None,
}

impl AgentProfile {
    pub fn sandbox_access(&self) -> SandboxAccess {
        match self {
            AgentProfile::Coder | AgentProfile::Tester => SandboxAccess::ReadWrite,
            AgentProfile::Reviewer | AgentProfile::Security => SandboxAccess::ReadOnly,
            AgentProfile::Critic | AgentProfile::Planner | AgentProfile::Researcher => {
                SandboxAccess::None
            }
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentProfile::Coder => {
                "You are the coder. Produce a complete, working artifact addressing the task \
                 and any feedback given. Use the available tools to read and write files."
            }
            AgentProfile::Reviewer => {
                "You are the reviewer. Inspect the artifact for correctness and quality. \
                 Reply with APPROVED on the first line if it is acceptable, otherwise give \
                 concrete feedback. You may add a line `ROUTE:security` or `ROUTE:tester` to \
                 request a specialist pass before the coder tries again."
            }
            AgentProfile::Critic => {
                "You are a hostile validator. Assume the artifact is wrong until proven \
                 otherwise. Look for hallucinated APIs, logic errors, security flaws, missed \
                 edge cases, and requirement omissions. Reply with VALID or REJECTED:<reason>."
            }
            AgentProfile::Planner => {
                "You are the planner. Break the task down into a short ordered plan the coder \
                 can follow."
            }
            AgentProfile::Tester => {
                "You are the tester. Write and describe tests that would catch regressions in \
                 the artifact, and report any failures you can reason about."
            }
            AgentProfile::Researcher => {
                "You are the researcher. Gather and summarize the facts the coder needs."
            }
            AgentProfile::Security => {
                "You are the security specialist. Audit the artifact for vulnerabilities and \
                 unsafe patterns and report findings concisely."
            }
        }
    }
}

// ─── PhaseRunner ───────────────────────────────────────────────────────────

/// One phase's worth of model interaction, scoped to a profile.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    async fn run_phase(&self, profile: AgentProfile, messages: Vec<Message>) -> Result<String, String>;
}

// ─── Verdicts ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialistRoute {
    Security,
    Tester,
}

#[derive(Debug, Clone)]
struct ReviewVerdict {
    approved: bool,
    feedback: String,
    route: Option<SpecialistRoute>,
}

fn parse_review(text: &str) -> ReviewVerdict {
    let trimmed = text.trim();
    if trimmed.to_uppercase().starts_with("APPROVED") {
        return ReviewVerdict {
            approved: true,
            feedback: String::new(),
            route: None,
        };
    }

    let route = Regex::new(r"(?i)ROUTE:\s*(security|tester)")
        .ok()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| match m.as_str().to_lowercase().as_str() {
            "security" => SpecialistRoute::Security,
            _ => SpecialistRoute::Tester,
        });

    ReviewVerdict {
        approved: false,
        feedback: trimmed.to_string(),
        route,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CriticVerdict {
    Valid,
    Rejected(String),
}

fn parse_critic(text: &str) -> CriticVerdict {
    let trimmed = text.trim();
    if trimmed.to_uppercase().starts_with("VALID") {
        return CriticVerdict::Valid;
    }
    let reason = trimmed
        .strip_prefix("REJECTED:")
        .or_else(|| trimmed.strip_prefix("Rejected:"))
        .unwrap_or(trimmed)
        .trim()
        .to_string();
    CriticVerdict::Rejected(reason)
}

// ─── SwarmRun ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmStatus {
    Approved,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SwarmRun {
    pub artifact: String,
    pub status: SwarmStatus,
    pub iterations: usize,
    pub plan: Option<String>,
    pub critic_warning: Option<String>,
}

// ─── SwarmOrchestrator ─────────────────────────────────────────────────────

pub struct SwarmOrchestrator {
    max_iterations: usize,
    compression_threshold: usize,
    human_hint: Mutex<Option<String>>,
}

impl SwarmOrchestrator {
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            compression_threshold: FEEDBACK_COMPRESSION_THRESHOLD,
            human_hint: Mutex::new(None),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Deliver a hint from an external channel; the next coder iteration
    /// prepends it as an `[URGENT USER MESSAGE]` block.
    pub fn inject_human_hint(&self, hint: impl Into<String>) {
        *self.human_hint.lock().unwrap_or_else(|e| e.into_inner()) = Some(hint.into());
    }

    fn take_human_hint(&self) -> Option<String> {
        self.human_hint.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Run the coder/reviewer/critic loop for `task`, using `run_phase` to
    /// execute each role's turn.
    #[tracing::instrument(skip(self, trace, runner, task), fields(trace_id))]
    pub async fn run(
        &self,
        trace: &TraceRecorder,
        trace_id: &str,
        parent_span: Option<&str>,
        task: String,
        runner: &dyn PhaseRunner,
    ) -> Result<SwarmRun, String> {
        let plan = self.run_planner(trace, trace_id, parent_span, &task, runner).await?;

        let mut artifact = String::new();
        let mut feedback_log = String::new();
        let mut iterations = 0usize;
        let mut approved = false;

        while iterations < self.max_iterations {
            iterations += 1;

            let mut coder_prompt = String::new();
            if let Some(hint) = self.take_human_hint() {
                coder_prompt.push_str(&format!("[URGENT USER MESSAGE]\n{hint}\n\n"));
            }
            coder_prompt.push_str(&format!("Task:\n{task}\n"));
            if let Some(plan) = &plan {
                coder_prompt.push_str(&format!("\nPlan:\n{plan}\n"));
            }
            if !feedback_log.is_empty() {
                coder_prompt.push_str(&format!("\nPrior feedback:\n{feedback_log}\n"));
            }
            if !artifact.is_empty() {
                coder_prompt.push_str(&format!("\nPrevious artifact:\n{artifact}\n"));
            }

            artifact = self
                .run_phase(trace, trace_id, parent_span, AgentProfile::Coder, coder_prompt, runner)
                .await?;

            let review_prompt = format!("Task:\n{task}\n\nArtifact:\n{artifact}\n");
            let review_text = self
                .run_phase(trace, trace_id, parent_span, AgentProfile::Reviewer, review_prompt, runner)
                .await?;
            let verdict = parse_review(&review_text);

            if verdict.approved {
                approved = true;
                break;
            }

            if let Some(route) = &verdict.route {
                let specialist = match route {
                    SpecialistRoute::Security => AgentProfile::Security,
                    SpecialistRoute::Tester => AgentProfile::Tester,
                };
                let specialist_prompt = format!("Task:\n{task}\n\nArtifact:\n{artifact}\n");
                let report = self
                    .run_phase(trace, trace_id, parent_span, specialist, specialist_prompt, runner)
                    .await?;
                feedback_log.push_str(&format!("\n[{specialist:?} report]\n{report}\n"));
            }

            feedback_log.push_str(&format!("\n[reviewer feedback]\n{}\n", verdict.feedback));

            if iterations > 2 && feedback_log.len() > self.compression_threshold {
                feedback_log = self
                    .compress_feedback(trace, trace_id, parent_span, &feedback_log, runner)
                    .await;
            }
        }

        let mut critic_warning = None;
        if approved {
            let critic_prompt = format!("Task:\n{task}\n\nArtifact:\n{artifact}\n");
            let critic_text = self
                .run_phase(trace, trace_id, parent_span, AgentProfile::Critic, critic_prompt, runner)
                .await?;
            if let CriticVerdict::Rejected(reason) = parse_critic(&critic_text) {
                critic_warning = Some(reason);
            }
        }

        Ok(SwarmRun {
            artifact,
            status: if approved {
                SwarmStatus::Approved
            } else {
                SwarmStatus::Exhausted
            },
            iterations,
            plan,
            critic_warning,
        })
    }

    async fn run_planner(
        &self,
        trace: &TraceRecorder,
        trace_id: &str,
        parent_span: Option<&str>,
        task: &str,
        runner: &dyn PhaseRunner,
    ) -> Result<Option<String>, String> {
        let plan = self
            .run_phase(
                trace,
                trace_id,
                parent_span,
                AgentProfile::Planner,
                format!("Task:\n{task}\n"),
                runner,
            )
            .await?;
        Ok(Some(plan))
    }

    /// Summarize accumulated feedback via one low-temperature call; on
    /// failure, fall back to truncating to the tail, which keeps the most
    /// recent (and thus most relevant) directive.
    async fn compress_feedback(
        &self,
        trace: &TraceRecorder,
        trace_id: &str,
        parent_span: Option<&str>,
        feedback_log: &str,
        runner: &dyn PhaseRunner,
    ) -> String {
        let prompt = format!(
            "Summarize the following accumulated review feedback into a short, actionable list. \
             Preserve the most recent directive.\n\n{feedback_log}"
        );
        match self
            .run_phase(trace, trace_id, parent_span, AgentProfile::Reviewer, prompt, runner)
            .await
        {
            Ok(summary) => summary,
            Err(_) => truncate_to(feedback_log, FEEDBACK_COMPRESSION_THRESHOLD),
        }
    }

    async fn run_phase(
        &self,
        trace: &TraceRecorder,
        trace_id: &str,
        parent_span: Option<&str>,
        profile: AgentProfile,
        prompt: String,
        runner: &dyn PhaseRunner,
    ) -> Result<String, String> {
        let span_id = trace
            .start_span(trace_id, SpanKind::Delegation, profile_span_name(profile), parent_span)
            .ok();

        let messages = vec![Message::system(profile.system_prompt()), Message::user(prompt)];
        let result = runner.run_phase(profile, messages).await;

        if let Some(span_id) = &span_id {
            let mut attrs = std::collections::HashMap::new();
            attrs.insert("profile".to_string(), format!("{profile:?}"));
            let status = if result.is_ok() { SpanStatus::Ok } else { SpanStatus::Error };
            let _ = trace.end_span(trace_id, span_id, status, attrs, vec![]);
        }

        result
    }
}

impl Default for SwarmOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn profile_span_name(profile: AgentProfile) -> &'static str {
    match profile {
        AgentProfile::Coder => "coder",
        AgentProfile::Reviewer => "reviewer",
        AgentProfile::Critic => "critic",
        AgentProfile::Planner => "planner",
        AgentProfile::Tester => "tester",
        AgentProfile::Researcher => "researcher",
        AgentProfile::Security => "security",
    }
}
