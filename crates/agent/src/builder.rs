//! Team assembly from configuration.

use std::sync::Arc;

use agenx_config::{AgentConfig, AgentRole, AppConfig};
use agenx_core::error::Error;
use agenx_core::tool::ToolRegistry;
use agenx_providers::BackendRouter;
use tracing::info;

use crate::agent::ChatAgent;
use crate::dispatcher::{TurnDispatcher, DEFAULT_PLANNER_PROMPT};
use crate::flow::{FlowListener, PrincipleFlow};
use crate::reasoning::ReasoningMode;
use crate::selector::Selector;
use crate::team::GroupChat;
use crate::user_proxy::{InputSource, UserProxyAgent};

pub const DEFAULT_HYPOTHESIS_PROMPT: &str = "You are a Hypothesis Agent specialized in formulating, \
refining, and testing scientific hypotheses. Your expertise lies in connecting theoretical frameworks \
with empirical observations, identifying potential causal relationships, and proposing testable \
predictions. You excel at critical thinking, maintaining scientific rigor, and adjusting hypotheses \
based on new evidence. Focus on clarity, falsifiability, and scientific value when generating \
hypotheses.";

pub const DEFAULT_EXPERIMENT_PROMPT: &str = "You are an Experiment Agent. You validate the latest \
hypothesis by running the characterization tools on the candidates it proposes, and you report the \
measured values exactly as the tools return them. Do not propose hypotheses yourself.";

/// Builds the planner, the configured agents, and the team around them.
pub struct TeamBuilder<'a> {
    config: &'a AppConfig,
    tools: ToolRegistry,
    input: Option<Arc<dyn InputSource>>,
}

impl<'a> TeamBuilder<'a> {
    pub fn new(config: &'a AppConfig, tools: ToolRegistry) -> Self {
        Self {
            config,
            tools,
            input: None,
        }
    }

    /// Where user proxies read their input.
    pub fn with_input(mut self, input: Arc<dyn InputSource>) -> Self {
        self.input = Some(input);
        self
    }

    /// The principle flow that tracks the configured agents.
    pub fn flow(&self) -> PrincipleFlow {
        self.config
            .agents
            .iter()
            .fold(PrincipleFlow::new(self.config.planner.principles.clone()), |flow, agent| {
                match agent.role {
                    AgentRole::Hypothesis => flow.with_hypothesis_agent(&agent.name),
                    AgentRole::Experiment => flow.with_experiment_agent(&agent.name),
                    AgentRole::UserProxy => flow,
                }
            })
    }

    fn tools_for(&self, requested: &[String]) -> ToolRegistry {
        let available = self.tools.names();
        self.tools.subset(&AppConfig::tools_for(requested, &available))
    }

    /// The planner, configured from `[planner]`.
    pub fn planner(&self, router: &mut BackendRouter) -> Result<TurnDispatcher, Error> {
        let planner = &self.config.planner;
        let mode = ReasoningMode::from_flags(planner.principled, planner.prompted);
        let flow: Arc<dyn FlowListener> = Arc::new(self.flow());

        let mut dispatcher = TurnDispatcher::new(
            &planner.name,
            router.default_backend()?,
            planner
                .system_message
                .clone()
                .unwrap_or_else(|| DEFAULT_PLANNER_PROMPT.to_string()),
        )
        .with_description("Plans the task and directs the other agents.")
        .with_mode(mode)
        .with_flow(flow)
        .with_tools(self.tools_for(&planner.tools))
        .with_streaming(self.config.stream)
        .with_reflection(planner.reflect_on_tool_use)
        .with_summary_format(&planner.tool_call_summary_format);

        if let Some(size) = planner.buffer_size {
            dispatcher = dispatcher.with_buffer_size(size);
        }

        info!(planner = %planner.name, mode = mode.name(), "Planner built");
        Ok(dispatcher)
    }

    /// One configured agent.
    pub fn agent(
        &self,
        agent: &AgentConfig,
        router: &mut BackendRouter,
    ) -> Result<Arc<dyn ChatAgent>, Error> {
        let backend = match &agent.model {
            Some(model) => router.for_model(model)?,
            None => router.default_backend()?,
        };

        let (prompt, description) = match agent.role {
            AgentRole::Hypothesis => (DEFAULT_HYPOTHESIS_PROMPT, "Proposes and refines hypotheses."),
            AgentRole::Experiment => (DEFAULT_EXPERIMENT_PROMPT, "Validates hypotheses with tools."),
            AgentRole::UserProxy => {
                let input = self.input.clone().ok_or_else(|| Error::Config {
                    message: format!("agent '{}' needs an input source", agent.name),
                })?;
                let proxy = UserProxyAgent::new(&agent.name, input);
                let proxy = match &agent.description {
                    Some(d) => proxy.with_description(d),
                    None => proxy,
                };
                return Ok(Arc::new(proxy));
            }
        };

        let dispatcher = TurnDispatcher::new(
            &agent.name,
            backend,
            agent.system_message.clone().unwrap_or_else(|| prompt.to_string()),
        )
        .with_description(agent.description.clone().unwrap_or_else(|| description.to_string()))
        .with_tools(self.tools_for(&agent.tools))
        .with_streaming(self.config.stream)
        .with_summary_format(&self.config.planner.tool_call_summary_format);

        Ok(Arc::new(dispatcher))
    }

    /// The full team: planner first, then the configured agents.
    pub fn build(&self, router: &mut BackendRouter) -> Result<GroupChat, Error> {
        let mut participants: Vec<Arc<dyn ChatAgent>> = vec![Arc::new(self.planner(router)?)];
        for agent in &self.config.agents {
            participants.push(self.agent(agent, router)?);
        }

        let selector = Selector::new(router.selector_backend()?);
        Ok(GroupChat::new(participants)
            .with_selector(selector)
            .with_max_turns(self.config.team.max_turns)
            .with_termination_text(&self.config.team.termination_text))
    }
}
