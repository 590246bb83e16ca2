//! Declarative intent catalog.
//!
//! Every [`Intent`] variant maps to exactly one [`IntentDefinition`] through
//! an exhaustive `match`, so adding an intent without patterns is a compile
//! error. Definitions are compiled once into an [`IntentCatalog`] and never
//! change afterwards.

use std::collections::BTreeMap;

use parley_core::{EntityType, EntityValue, Intent};
use regex::Regex;

/// Static description of one intent.
#[derive(Debug, Clone, Copy)]
pub struct IntentDefinition {
    pub intent: Intent,
    /// Regular expressions applied to the normalized utterance.
    pub patterns: &'static [&'static str],
    /// Whole-word phrases that add a smaller bonus.
    pub keywords: &'static [&'static str],
    pub required: &'static [EntityType],
    pub optional: &'static [EntityType],
    /// Parameter defaults, keyed by parameter name.
    pub defaults: &'static [(&'static str, &'static str)],
    /// Action verbs with their trigger phrases, checked in order.
    pub actions: &'static [(&'static str, &'static [&'static str])],
    pub default_action: Option<&'static str>,
    /// Actions whose required types differ from `required`.
    pub action_required: &'static [(&'static str, &'static [EntityType])],
}

const NONE: &[EntityType] = &[];

/// The definition for an intent.
pub fn definition(intent: Intent) -> IntentDefinition {
    use EntityType::*;

    match intent {
        // =====================================================================
        // Weather
        // =====================================================================
        Intent::Weather => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:weather|temperature|forecast|rain|raining|sunny|cloudy|storm|stormy|snow|snowing|humid|humidity|windy)\b",
                r"\bhow\s+(?:hot|cold|warm|chilly)\b",
                r"\bwill\s+it\s+(?:rain|snow|be\s+sunny|be\s+cold|be\s+hot)\b",
                r"\bweather\s+(?:in|for|at|like)\b",
                r"\bumbrella\b",
            ],
            keywords: &["weather", "temperature", "rain", "sunny", "cloudy", "forecast"],
            required: &[Location],
            optional: &[Datetime],
            defaults: &[("time", "now")],
            actions: &[
                (
                    "forecast",
                    &["forecast", "tomorrow", "tonight", "next", "later", "week", "weekend"],
                ),
                ("current", &["now", "current", "today"]),
            ],
            default_action: Some("current"),
            action_required: &[],
        },

        // =====================================================================
        // Music
        // =====================================================================
        Intent::Music => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:play|playing|listen\s+to)\b",
                r"\b(?:music|song|songs|track|album|artist|playlist|spotify)\b",
                r"\b(?:pause|resume|skip|unpause)\b",
                r"\b(?:volume|louder|quieter)\b",
            ],
            keywords: &["play", "music", "song", "pause", "volume"],
            required: NONE,
            optional: &[Genre, Query],
            defaults: &[],
            actions: &[
                ("pause", &["pause", "stop"]),
                ("resume", &["resume", "unpause", "continue"]),
                ("next", &["next", "skip"]),
                ("previous", &["previous", "last song", "go back"]),
                ("volume", &["volume", "louder", "quieter", "turn up", "turn down"]),
                ("play", &["play"]),
            ],
            default_action: Some("play"),
            action_required: &[],
        },

        // =====================================================================
        // Time
        // =====================================================================
        Intent::Time => IntentDefinition {
            intent,
            patterns: &[
                r"\bwhat\s+time\b",
                r"\b(?:current|local)\s+time\b",
                r"\btime\s+is\s+it\b",
                r"\bclock\b",
            ],
            keywords: &["time", "clock"],
            required: NONE,
            optional: &[Location],
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },

        // =====================================================================
        // Calendar
        // =====================================================================
        Intent::Calendar => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:calendar|appointment|appointments|meeting|meetings|schedule|event|agenda)\b",
                r"\bwhat\s+is\s+on\s+my\b",
                r"\b(?:am\s+i|are\s+we)\s+(?:free|busy)\b",
            ],
            keywords: &["calendar", "meeting", "appointment", "schedule"],
            required: NONE,
            optional: &[Datetime],
            defaults: &[],
            actions: &[("create", &["create", "add", "schedule", "book", "new"])],
            default_action: Some("list"),
            action_required: &[],
        },

        // =====================================================================
        // Timer
        // =====================================================================
        Intent::Timer => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:timer|alarm|countdown|stopwatch)\b",
                r"\b(?:set|start)\s+(?:a\s+|an\s+|the\s+)?(?:timer|alarm|countdown)\b",
                r"\bremind\s+me\s+in\b",
                r"\bhow\s+much\s+time\s+(?:is\s+)?left\b",
                r"\b(?:time|minutes)\s+(?:is\s+|are\s+)?(?:left|remaining)\b",
            ],
            keywords: &["timer", "alarm", "countdown"],
            required: &[Duration],
            optional: NONE,
            defaults: &[],
            actions: &[
                ("cancel", &["cancel", "stop", "delete"]),
                ("check", &["how much time", "how long", "check", "left", "remaining"]),
                ("set", &["set", "start"]),
            ],
            default_action: Some("set"),
            action_required: &[("cancel", NONE), ("check", NONE)],
        },

        // =====================================================================
        // Calculator
        // =====================================================================
        Intent::Calculator => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:calculate|compute|math|plus|minus|times|divided|multiplied|sum|square\s+root)\b",
                r"\d+\s*[-+*/x]\s*\d+",
                r"\bwhat\s+is\s+\d+",
            ],
            keywords: &["calculate", "plus", "minus", "times"],
            required: &[Expression],
            optional: &[Number],
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },

        // =====================================================================
        // System
        // =====================================================================
        Intent::System => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:system|computer|cpu|memory|disk|battery|ram)\b",
                r"\b(?:shutdown|restart|reboot|lock\s+(?:the\s+)?screen)\b",
                r"\bsystem\s+(?:status|info|information)\b",
            ],
            keywords: &["system", "cpu", "battery", "memory"],
            required: NONE,
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },

        // =====================================================================
        // Web
        // =====================================================================
        Intent::Web => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:search|google|look\s+up|browse)\b",
                r"\b(?:website|browser|web\s+page|webpage|url)\b",
                r"\bopen\b",
                r"\b(?:youtube|github|stackoverflow|stack\s+overflow|reddit)\b",
            ],
            keywords: &["search", "google", "open", "website"],
            required: &[Query],
            optional: NONE,
            defaults: &[],
            actions: &[("open", &["open", "go to", "launch"])],
            default_action: Some("search"),
            action_required: &[],
        },

        // =====================================================================
        // Email
        // =====================================================================
        Intent::Email => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:email|emails|e-mail|mail|inbox|unread)\b",
                r"\b(?:send|compose|write)\s+(?:an?\s+)?(?:email|message|mail)\b",
                r"\bcheck\s+(?:my\s+)?(?:email|mail|inbox|messages)\b",
            ],
            keywords: &["email", "mail", "inbox", "message"],
            required: NONE,
            optional: &[Person],
            defaults: &[],
            actions: &[("send", &["send", "write", "compose", "reply"])],
            default_action: Some("check"),
            action_required: &[],
        },

        // =====================================================================
        // News
        // =====================================================================
        Intent::News => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:news|headlines|headline|breaking)\b",
                r"\b(?:latest|current)\s+(?:events|updates|stories)\b|\bwhat\s+is\s+happening\b",
            ],
            keywords: &["news", "headlines"],
            required: NONE,
            optional: &[Query],
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },

        // =====================================================================
        // Wikipedia
        // =====================================================================
        Intent::Wikipedia => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:wikipedia|wiki)\b",
                r"\b(?:tell\s+me\s+about|who\s+is|who\s+was|information\s+(?:about|on)|facts\s+about)\b",
            ],
            keywords: &["wikipedia", "wiki"],
            required: &[Query],
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },

        // =====================================================================
        // Small talk
        // =====================================================================
        Intent::Joke => IntentDefinition {
            intent,
            patterns: &[r"\b(?:joke|jokes|funny|humor|humour)\b", r"\bmake\s+me\s+laugh\b"],
            keywords: &["joke", "funny"],
            required: NONE,
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },
        Intent::Greeting => IntentDefinition {
            intent,
            patterns: &[
                r"^(?:hello|hi|hey|greetings|good\s+(?:morning|afternoon|evening))\b",
                r"\bhow\s+are\s+you\b|\bwhat\s+is\s+up\b",
            ],
            keywords: &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
            required: NONE,
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },
        Intent::Goodbye => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:bye|goodbye|farewell|see\s+you|good\s+night)\b",
                r"\b(?:exit|quit|shut\s+down|turn\s+off)\b",
            ],
            keywords: &["bye", "goodbye", "exit", "quit"],
            required: NONE,
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },
        Intent::Help => IntentDefinition {
            intent,
            patterns: &[
                r"\b(?:help|assist|assistance|support)\b",
                r"\bwhat\s+can\s+you\s+do\b",
                r"\b(?:commands|capabilities|features)\b",
            ],
            keywords: &["help"],
            required: NONE,
            optional: NONE,
            defaults: &[],
            actions: &[],
            default_action: None,
            action_required: &[],
        },
    }
}

// =============================================================================
// Compiled catalog
// =============================================================================

/// One intent with its regexes compiled.
pub struct CompiledIntent {
    pub definition: IntentDefinition,
    name: Regex,
    pub patterns: Vec<Regex>,
    pub keywords: Vec<(&'static str, Regex)>,
    actions: Vec<(&'static str, Vec<Regex>)>,
}

impl CompiledIntent {
    fn compile(definition: IntentDefinition) -> Self {
        let patterns = definition
            .patterns
            .iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect();
        let keywords = definition
            .keywords
            .iter()
            .map(|k| (*k, phrase_regex(k)))
            .collect();
        let actions = definition
            .actions
            .iter()
            .map(|(action, triggers)| (*action, triggers.iter().map(|t| phrase_regex(t)).collect()))
            .collect();
        Self {
            name: phrase_regex(definition.intent.as_str()),
            definition,
            patterns,
            keywords,
            actions,
        }
    }

    pub fn intent(&self) -> Intent {
        self.definition.intent
    }

    /// Number of distinct patterns that match the normalized text.
    pub fn pattern_hits(&self, normalized: &str) -> usize {
        self.patterns.iter().filter(|r| r.is_match(normalized)).count()
    }

    /// Number of keywords present as whole words.
    pub fn keyword_hits(&self, normalized: &str) -> usize {
        self.keywords.iter().filter(|(_, r)| r.is_match(normalized)).count()
    }

    /// Whether the text mentions the intent's name or one of its keywords.
    pub fn is_named_in(&self, normalized: &str) -> bool {
        self.name.is_match(normalized) || self.keyword_hits(normalized) > 0
    }

    pub fn requires(&self, entity_type: EntityType) -> bool {
        self.definition.required.contains(&entity_type)
    }

    /// Whether `entity_type` must be filled when performing `action`.
    pub fn requires_for(&self, entity_type: EntityType, action: Option<&str>) -> bool {
        action
            .and_then(|a| {
                self.definition
                    .action_required
                    .iter()
                    .find(|(name, _)| *name == a)
            })
            .map_or(self.definition.required, |(_, types)| *types)
            .contains(&entity_type)
    }

    pub fn accepts(&self, entity_type: EntityType) -> bool {
        self.requires(entity_type) || self.definition.optional.contains(&entity_type)
    }

    /// Required and optional types, required first.
    pub fn parameter_types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.definition
            .required
            .iter()
            .chain(self.definition.optional.iter())
            .copied()
    }

    pub fn default_for(&self, param: &str) -> Option<&'static str> {
        self.definition
            .defaults
            .iter()
            .find(|(name, _)| *name == param)
            .map(|(_, value)| *value)
    }

    /// Pick the action whose triggers appear in the text or in a parameter
    /// value, falling back to the default action.
    pub fn select_action(
        &self,
        normalized: &str,
        parameters: &BTreeMap<String, EntityValue>,
    ) -> Option<&'static str> {
        let mut haystack = normalized.to_string();
        for value in parameters.values() {
            haystack.push(' ');
            haystack.push_str(&value.to_string().to_lowercase());
        }
        self.actions
            .iter()
            .find(|(_, triggers)| triggers.iter().any(|t| t.is_match(&haystack)))
            .map(|(action, _)| *action)
            .or(self.definition.default_action)
    }
}

fn phrase_regex(phrase: &str) -> Regex {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    Regex::new(&format!(r"\b{}\b", words.join(r"\s+"))).expect("Invalid keyword regex")
}

/// All intents, compiled, in declaration order.
pub struct IntentCatalog {
    intents: Vec<CompiledIntent>,
}

impl Default for IntentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentCatalog {
    pub fn new() -> Self {
        Self {
            intents: Intent::ALL
                .iter()
                .map(|i| CompiledIntent::compile(definition(*i)))
                .collect(),
        }
    }

    pub fn get(&self, intent: Intent) -> &CompiledIntent {
        &self.intents[intent.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledIntent> {
        self.intents.iter()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
