use rand::Rng;
use serde::{Deserialize, Serialize};

/// Festive activity the two people are shown doing together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    DecoratingTree,
    BuildingSnowman,
    IceSkating,
    BakingCookies,
    SleighRide,
    HotCocoaByFire,
    WrappingPresents,
    CarolSinging,
    SnowballFight,
    ChristmasMarket,
    GingerbreadHouse,
    HangingLights,
    ExchangingGifts,
}

impl Scenario {
    pub const ALL: [Scenario; 13] = [
        Scenario::DecoratingTree,
        Scenario::BuildingSnowman,
        Scenario::IceSkating,
        Scenario::BakingCookies,
        Scenario::SleighRide,
        Scenario::HotCocoaByFire,
        Scenario::WrappingPresents,
        Scenario::CarolSinging,
        Scenario::SnowballFight,
        Scenario::ChristmasMarket,
        Scenario::GingerbreadHouse,
        Scenario::HangingLights,
        Scenario::ExchangingGifts,
    ];

    /// Uniform pick over [`Scenario::ALL`].
    pub fn pick<R: Rng>(rng: &mut R) -> Scenario {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn slug(self) -> &'static str {
        match self {
            Scenario::DecoratingTree => "decorating_tree",
            Scenario::BuildingSnowman => "building_snowman",
            Scenario::IceSkating => "ice_skating",
            Scenario::BakingCookies => "baking_cookies",
            Scenario::SleighRide => "sleigh_ride",
            Scenario::HotCocoaByFire => "hot_cocoa_by_fire",
            Scenario::WrappingPresents => "wrapping_presents",
            Scenario::CarolSinging => "carol_singing",
            Scenario::SnowballFight => "snowball_fight",
            Scenario::ChristmasMarket => "christmas_market",
            Scenario::GingerbreadHouse => "gingerbread_house",
            Scenario::HangingLights => "hanging_lights",
            Scenario::ExchangingGifts => "exchanging_gifts",
        }
    }

    pub fn from_slug(raw: &str) -> Option<Scenario> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.slug() == normalized)
    }

    /// Scene text embedded into the image prompt.
    pub fn description(self) -> &'static str {
        match self {
            Scenario::DecoratingTree => {
                "decorating a tall Christmas tree together, hanging glass ornaments and tinsel \
                 in a cozy living room"
            }
            Scenario::BuildingSnowman => {
                "building a cheerful snowman together in a snowy garden, \
                 adding a scarf and a carrot nose"
            }
            Scenario::IceSkating => {
                "ice skating side by side on a frozen pond lit by string lights at dusk"
            }
            Scenario::BakingCookies => {
                "baking and icing Christmas cookies together in a warm kitchen dusted with flour"
            }
            Scenario::SleighRide => {
                "riding in a horse-drawn sleigh through a snowy pine forest under soft falling snow"
            }
            Scenario::HotCocoaByFire => {
                "sharing mugs of hot cocoa beside a crackling fireplace hung with stockings"
            }
            Scenario::WrappingPresents => {
                "wrapping colorful presents with ribbons and bows at a table covered in gift paper"
            }
            Scenario::CarolSinging => {
                "singing Christmas carols together on a snowy street holding songbooks and lanterns"
            }
            Scenario::SnowballFight => {
                "having a playful snowball fight in a snow-covered park, both laughing"
            }
            Scenario::ChristmasMarket => {
                "strolling through a festive Christmas market with glowing stalls and mulled drinks"
            }
            Scenario::GingerbreadHouse => {
                "building an elaborate gingerbread house decorated with candy and icing"
            }
            Scenario::HangingLights => {
                "hanging twinkling Christmas lights along the porch of a snowy cottage"
            }
            Scenario::ExchangingGifts => {
                "exchanging wrapped gifts in front of a glowing Christmas tree, both smiling"
            }
        }
    }
}
