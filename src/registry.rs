//! The provider catalog.
//!
//! A static table of answer-generation backends. Which entries are offered
//! to users depends only on which credentials were configured at process
//! start; nothing here changes at runtime.

use crate::config::Credentials;

/// The external service family a provider belongs to. This affects the
/// call shape inside the dispatcher, not the lifecycle control flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// OpenAI's own API.
    OpenAi,
    /// Groq, via its OpenAI-compatible endpoint.
    Groq,
    /// Google Gemini.
    Gemini,
}

/// Whether using a provider costs money.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CostTier {
    Free,
    Paid,
}

impl CostTier {
    /// Badge shown next to the provider name in the selection keyboard.
    pub fn badge(self) -> &'static str {
        match self {
            CostTier::Free => "🆓",
            CostTier::Paid => "💰",
        }
    }
}

/// One entry in the provider catalog.
#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    /// Unique id, also used in callback tokens.
    pub id: &'static str,
    /// Human-readable name shown in keyboards and answer attributions.
    pub display_name: &'static str,
    /// Which backend family serves this provider.
    pub backend: BackendKind,
    /// Free or paid.
    pub cost: CostTier,
    /// The backend-specific model name.
    pub model: &'static str,
}

/// The full catalog, in the order providers are presented to users.
static CATALOG: &[ProviderDescriptor] = &[
    ProviderDescriptor {
        id: "openai_gpt35",
        display_name: "OpenAI GPT-3.5 Turbo",
        backend: BackendKind::OpenAi,
        cost: CostTier::Paid,
        model: "gpt-3.5-turbo",
    },
    ProviderDescriptor {
        id: "openai_gpt4",
        display_name: "OpenAI GPT-4",
        backend: BackendKind::OpenAi,
        cost: CostTier::Paid,
        model: "gpt-4",
    },
    ProviderDescriptor {
        id: "groq_llama3",
        display_name: "Groq Llama 3 8B",
        backend: BackendKind::Groq,
        cost: CostTier::Free,
        model: "llama3-8b-8192",
    },
    ProviderDescriptor {
        id: "groq_mixtral",
        display_name: "Groq Mixtral 8x7B",
        backend: BackendKind::Groq,
        cost: CostTier::Free,
        model: "mixtral-8x7b-32768",
    },
    ProviderDescriptor {
        id: "gemini",
        display_name: "Google Gemini 1.5 Flash",
        backend: BackendKind::Gemini,
        cost: CostTier::Free,
        model: "gemini-1.5-flash",
    },
];

/// The provider catalog plus the availability snapshot taken at startup.
#[derive(Debug)]
pub struct Registry {
    openai_available: bool,
    groq_available: bool,
    gemini_available: bool,
}

impl Registry {
    /// Capture availability from the configured credentials.
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            openai_available: credentials.openai_api_key.is_some(),
            groq_available: credentials.groq_api_key.is_some(),
            gemini_available: credentials.gemini_api_key.is_some(),
        }
    }

    /// Is a backend's credential configured?
    pub fn is_available(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::OpenAi => self.openai_available,
            BackendKind::Groq => self.groq_available,
            BackendKind::Gemini => self.gemini_available,
        }
    }

    /// Providers we can actually offer, in catalog order.
    pub fn list_available(&self) -> impl Iterator<Item = &'static ProviderDescriptor> + '_ {
        CATALOG
            .iter()
            .filter(|desc| self.is_available(desc.backend))
    }

    /// Look up a provider by id. Does not filter by availability; a known
    /// but unconfigured provider fails later at dispatch with a credential
    /// error, which is more informative than "unknown provider".
    pub fn get(&self, id: &str) -> Option<&'static ProviderDescriptor> {
        CATALOG.iter().find(|desc| desc.id == id)
    }
}
