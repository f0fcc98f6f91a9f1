//! The closed set of story genres.
//!
//! Each genre owns everything that distinguishes its writer: the tool the
//! router calls, the corpus directory, the persona, and the five-stage arc
//! with word budgets. The oracle's routing choice only ever becomes a
//! [`Genre`] through [`Genre::from_tool_name`] or [`Genre::from_key`].

use serde::{Deserialize, Serialize};
use std::fmt;
use story_macros::Tool;

/// A story genre with its own specialized writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    /// Princesses, castles, fairy godmothers, enchantment.
    RoyalMagical,
    /// Christmas, Santa, winter, giving.
    Holiday,
    /// Animal protagonists, nature, wildlife wisdom.
    AnimalNature,
}

/// Input accepted by every genre writer tool.
///
/// Write one complete children's story from a directive.
#[derive(Debug, Clone, Tool, Deserialize)]
pub struct WriterInput {
    /// What to write. For a change request, restate the original story idea together with the requested change.
    pub user_request: String,
}

/// One stage of a genre's five-part narrative arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcStage {
    pub title: &'static str,
    /// Inclusive word budget for the stage.
    pub words: (u32, u32),
    pub beats: &'static [&'static str],
}

const ROYAL_ARC: [ArcStage; 5] = [
    ArcStage {
        title: "CHARACTER IN SITUATION",
        words: (80, 100),
        beats: &[
            "Introduce the princess in her current life: trapped, overlooked, or longing",
            "Show her kind heart despite the difficulty",
            "Establish what she dreams of",
            "Use dialogue and inner thoughts",
        ],
    },
    ArcStage {
        title: "OPPORTUNITY OR MAGICAL HELPER",
        words: (80, 100),
        beats: &[
            "Bring in a magical element: a fairy godmother, a prince, an enchanted object",
            "Create a moment of hope and wonder",
        ],
    },
    ArcStage {
        title: "TRANSFORMATION OR JOURNEY",
        words: (120, 150),
        beats: &[
            "A magical transformation or an escape plan",
            "The princess acts with courage",
            "Magical details and helpers along the way",
            "Build tension with obstacles",
        ],
    },
    ArcStage {
        title: "CRISIS AND CLIMAX",
        words: (80, 100),
        beats: &[
            "A time limit, a discovery, or a major obstacle",
            "She must choose, and shows she is brave, kind, or clever",
        ],
    },
    ArcStage {
        title: "REUNION AND RESOLUTION",
        words: (60, 80),
        beats: &[
            "The quest is complete or the reunion happens",
            "A happy ending with a lesson learned",
            "A happily-ever-after tone",
        ],
    },
];

const HOLIDAY_ARC: [ArcStage; 5] = [
    ArcStage {
        title: "HUMBLE BEGINNING",
        words: (80, 100),
        beats: &[
            "Introduce the characters in a modest, cozy Christmas setting",
            "Show their love for each other and for the season",
            "Establish what they lack or wish for",
        ],
    },
    ArcStage {
        title: "PROBLEM OR WISH",
        words: (80, 100),
        beats: &[
            "Someone wants to give the perfect gift or save Christmas",
            "Show the obstacle or their limited means",
            "Reveal what is most precious to them",
        ],
    },
    ArcStage {
        title: "SACRIFICE OR ACTION",
        words: (120, 150),
        beats: &[
            "A sacrifice or a brave action",
            "The journey: seeking, making, searching",
            "Snow, decorations, and holiday atmosphere",
            "Build anticipation",
        ],
    },
    ArcStage {
        title: "TWIST OR REVELATION",
        words: (80, 100),
        beats: &[
            "An unexpected discovery or a magical moment",
            "The emotional climax",
        ],
    },
    ArcStage {
        title: "WARM RESOLUTION",
        words: (60, 80),
        beats: &[
            "Love, giving, and the Christmas spirit win",
            "A lesson about the true meaning of giving",
            "Leave the reader feeling warm",
        ],
    },
];

const ANIMAL_ARC: [ArcStage; 5] = [
    ArcStage {
        title: "ANIMAL IN HABITAT",
        words: (80, 100),
        beats: &[
            "Introduce the animal with specific personality traits",
            "Describe the natural setting with rich sensory detail",
            "Show the animal's place in its family or community",
        ],
    },
    ArcStage {
        title: "CONFLICT ARISES",
        words: (80, 100),
        beats: &[
            "A natural problem or threat appears",
            "Show how it affects the animal and others",
            "Raise the stakes",
        ],
    },
    ArcStage {
        title: "QUEST OR STRUGGLE",
        words: (120, 150),
        beats: &[
            "The animal seeks a solution with instinct or wisdom",
            "Obstacles and difficult choices",
            "Help from other animals, and growth",
        ],
    },
    ArcStage {
        title: "TRIUMPH OR TRANSFORMATION",
        words: (80, 100),
        beats: &[
            "The animal succeeds through its unique traits",
            "Courage, cleverness, or kindness overcomes the challenge",
        ],
    },
    ArcStage {
        title: "LEGACY AND LESSON",
        words: (60, 80),
        beats: &[
            "The positive impact on the community",
            "A clear moral about courage, kindness, or wisdom",
            "End with peace and belonging",
        ],
    },
];

impl Genre {
    /// Every genre, in routing order.
    pub const ALL: [Genre; 3] = [Genre::RoyalMagical, Genre::Holiday, Genre::AnimalNature];

    /// Stable key used in the narrowed routing enumeration.
    pub fn key(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "royal_magical",
            Genre::Holiday => "holiday",
            Genre::AnimalNature => "animal_nature",
        }
    }

    /// Name of the writer tool offered to the router.
    pub fn tool_name(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "generate_princess_story",
            Genre::Holiday => "generate_christmas_story",
            Genre::AnimalNature => "generate_animal_story",
        }
    }

    /// When the router should pick this genre.
    pub fn routing_hint(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "princess, royal, castle, magic, fairy tale themes",
            Genre::Holiday => "Christmas, holiday, Santa, winter, giving themes",
            Genre::AnimalNature => "animal characters, nature, wildlife, animal wisdom themes",
        }
    }

    /// Directory under the corpus root holding this genre's example stories.
    pub fn corpus_dir(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "princess",
            Genre::Holiday => "christmas",
            Genre::AnimalNature => "animals",
        }
    }

    /// Human-facing writer name.
    pub fn label(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "Princess Writer",
            Genre::Holiday => "Christmas Writer",
            Genre::AnimalNature => "Animal Writer",
        }
    }

    pub fn tagline(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "Royal tales with magic and enchantment",
            Genre::Holiday => "Holiday stories about giving and joy",
            Genre::AnimalNature => "Wise animals and nature lessons",
        }
    }

    /// What a story of this genre is called in prompts.
    pub fn story_noun(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "princess story",
            Genre::Holiday => "Christmas story",
            Genre::AnimalNature => "animal tale",
        }
    }

    pub fn sensory_palette(self) -> &'static str {
        match self {
            Genre::RoyalMagical => "sights and sounds of castles, gowns, and sparkling magic",
            Genre::Holiday => "snow, warmth, holiday smells and sounds",
            Genre::AnimalNature => "forest sounds, animal movements, the sights of nature",
        }
    }

    pub fn key_elements(self) -> &'static [&'static str] {
        match self {
            Genre::RoyalMagical => &[
                "Royal or magical setting with vivid descriptions",
                "Kind, brave protagonist with a clear character arc",
                "Enchanting elements such as a fairy godmother or magic",
                "Positive lesson about kindness, courage, or believing in yourself",
            ],
            Genre::Holiday => &[
                "Christmas or winter setting with vivid sensory details",
                "Themes of giving, kindness, family, and love",
                "Holiday magic and wonder",
                "Positive lesson about generosity, sharing, or the Christmas spirit",
            ],
            Genre::AnimalNature => &[
                "Animal characters with natural behaviors and clear arcs",
                "Nature setting and wildlife with vivid sensory descriptions",
                "Problems solved through animal traits, instincts, or wisdom",
                "Positive lesson about cooperation, patience, kindness, or nature",
            ],
        }
    }

    /// The genre's five-stage arc, in story order.
    pub fn arc(self) -> &'static [ArcStage; 5] {
        match self {
            Genre::RoyalMagical => &ROYAL_ARC,
            Genre::Holiday => &HOLIDAY_ARC,
            Genre::AnimalNature => &ANIMAL_ARC,
        }
    }

    /// Tool definition the router offers for this genre.
    pub fn tool(self) -> claude::Tool {
        claude::Tool {
            name: self.tool_name().to_string(),
            description: format!(
                "Write a complete {} for children ages 5-10. Use for {}.",
                self.story_noun(),
                self.routing_hint()
            ),
            input_schema: WriterInput::input_schema(),
        }
    }

    /// Resolve a writer tool name chosen by the oracle.
    pub fn from_tool_name(name: &str) -> Option<Genre> {
        Genre::ALL.into_iter().find(|g| g.tool_name() == name.trim())
    }

    /// Resolve a narrowed-routing key chosen by the oracle.
    pub fn from_key(key: &str) -> Option<Genre> {
        let key = key.trim().to_ascii_lowercase();
        Genre::ALL.into_iter().find(|g| g.key() == key)
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
