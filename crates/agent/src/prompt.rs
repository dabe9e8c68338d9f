//! System prompt assembly: persona, rules, tone.

use supportdesk_config::AgentConfig;
use supportdesk_tools::SupportTool;

use crate::sentiment::Sentiment;

/// Who the agent presents itself as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub agent_name: String,
    pub company_name: String,
}

impl Persona {
    pub fn new(agent_name: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            company_name: company_name.into(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(&config.agent_name, &config.company_name)
    }

    pub fn greeting(&self) -> String {
        format!(
            "Hi! I'm {} from {} support. How can I help you today?",
            self.agent_name, self.company_name
        )
    }

    pub fn farewell(&self) -> String {
        format!(
            "Thank you for contacting {} support. See you next time!",
            self.company_name
        )
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::new("Mynko", "NebulaSoft")
    }
}

/// Build the system prompt for one user turn.
pub fn system_prompt(persona: &Persona, sentiment: Sentiment) -> String {
    let search = SupportTool::SearchKnowledgeBase.name();
    let pricing = SupportTool::CalculatePricing.name();
    let ticket = SupportTool::CreateTicket.name();
    let company = &persona.company_name;

    format!(
        "You are {name}, a Tier-1 technical support representative for {company}.\n\
         You are helpful, professional and knowledgeable, and you represent {company}.\n\
         \n\
         RULES:\n\
         1. Never use general knowledge to answer technical questions about {company}. \
         Answer only from the knowledge base excerpts below or from {search} results.\n\
         2. Always cite the source document you used (e.g. \"According to nebula_manual.txt...\").\n\
         3. If the excerpts below do not cover the question, call {search} with a better query.\n\
         4. Use {pricing} for any pricing or cost question; never compute prices yourself.\n\
         5. Call {ticket} only when the documentation cannot answer the question or the issue \
         needs a human. Pick the severity from the customer's urgency.\n\
         6. Never invent features, error codes or solutions.\n\
         \n\
         RESPONSE STYLE:\n\
         {tone}",
        name = persona.agent_name,
        tone = sentiment.tone(),
    )
}
