use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// B5 sheet size in points, used by the no-template fallback path.
pub const B5_SIZE: (f32, f32) = (498.9, 708.7);

/// Default text size for primary fields on fallback pages.
const PRIMARY_SIZE: f32 = 14.0;
/// A4 statements use larger primaries.
const A4_PRIMARY_SIZE: f32 = 20.0;
/// Address title/description pairs render as fine print.
const FINE_PRINT_SIZE: f32 = 8.0;

/// The supported card catalog. Each variant selects a field schema,
/// a fallback coordinate layout and a default template file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardType {
    Platinum,
    Corporate,
    Business,
    Isic,
    Itic,
    Iytc,
    A4,
    CardCollection,
}

impl CardType {
    pub const ALL: [CardType; 8] = [
        CardType::Platinum,
        CardType::Corporate,
        CardType::Business,
        CardType::Isic,
        CardType::Itic,
        CardType::Iytc,
        CardType::A4,
        CardType::CardCollection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Platinum => "platinum",
            CardType::Corporate => "corporate",
            CardType::Business => "business",
            CardType::Isic => "isic",
            CardType::Itic => "itic",
            CardType::Iytc => "iytc",
            CardType::A4 => "a4",
            CardType::CardCollection => "cardcollection",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "platinum" => Ok(CardType::Platinum),
            "corporate" => Ok(CardType::Corporate),
            "business" => Ok(CardType::Business),
            "isic" => Ok(CardType::Isic),
            "itic" => Ok(CardType::Itic),
            "iytc" => Ok(CardType::Iytc),
            "a4" => Ok(CardType::A4),
            "cardcollection" => Ok(CardType::CardCollection),
            other => Err(Error::UnsupportedCardType(other.to_string())),
        }
    }
}

/// Closed set of canonical data elements a card can carry. Spreadsheet
/// headers resolve into this enum via the alias table in `headers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ActivationCode,
    LastFourDigits,
    Name,
    PhoneNumber,
    DeliveryAddress,
    AddressTitle,
    AddressDescription,
    OnboardingName,
    University,
}

impl Field {
    pub const fn canonical(&self) -> &'static str {
        match self {
            Field::ActivationCode => "activation code",
            Field::LastFourDigits => "last four digits",
            Field::Name => "name",
            Field::PhoneNumber => "phone number",
            Field::DeliveryAddress => "delivery address",
            Field::AddressTitle => "address title",
            Field::AddressDescription => "address description",
            Field::OnboardingName => "onboarding name",
            Field::University => "university",
        }
    }
}

/// Per-type layout description: field order (significant: it drives
/// both fallback coordinate indexing and dash-anchor assignment) plus
/// fallback coordinates in top-origin points on a B5 sheet.
#[derive(Debug)]
pub struct CardSchema {
    pub fields: &'static [Field],
    pub coordinates: &'static [(f32, f32)],
    pub default_template: &'static str,
}

impl CardSchema {
    pub fn font_size(&self, card_type: CardType, field: Field) -> f32 {
        match field {
            Field::AddressTitle | Field::AddressDescription => FINE_PRINT_SIZE,
            _ if card_type == CardType::A4 => A4_PRIMARY_SIZE,
            _ => PRIMARY_SIZE,
        }
    }
}

static PLATINUM: CardSchema = CardSchema {
    fields: &[
        Field::ActivationCode,
        Field::LastFourDigits,
        Field::Name,
        Field::PhoneNumber,
        Field::DeliveryAddress,
        Field::AddressTitle,
        Field::AddressDescription,
    ],
    coordinates: &[
        (288.0, 375.0),
        (258.0, 406.0),
        (183.0, 435.0),
        (245.0, 465.0),
        (230.0, 507.0),
        (123.0, 568.0),
        (123.0, 585.0),
    ],
    default_template: "platinum.pdf",
};

static CORPORATE: CardSchema = CardSchema {
    fields: &[
        Field::ActivationCode,
        Field::Name,
        Field::LastFourDigits,
        Field::PhoneNumber,
        Field::DeliveryAddress,
    ],
    coordinates: &[
        (155.0, 375.0),
        (152.0, 407.0),
        (152.0, 470.0),
        (152.0, 525.0),
        (152.0, 585.0),
    ],
    default_template: "Corporate.pdf",
};

static BUSINESS: CardSchema = CardSchema {
    fields: &[
        Field::ActivationCode,
        Field::LastFourDigits,
        Field::Name,
        Field::OnboardingName,
        Field::PhoneNumber,
        Field::DeliveryAddress,
        Field::AddressTitle,
        Field::AddressDescription,
    ],
    coordinates: &[
        (280.0, 375.0),
        (290.0, 405.0),
        (210.0, 430.0),
        (185.0, 445.0),
        (240.0, 470.0),
        (230.0, 507.0),
        (123.0, 568.0),
        (123.0, 585.0),
    ],
    default_template: "Business.pdf",
};

static ISIC: CardSchema = CardSchema {
    fields: &[
        Field::LastFourDigits,
        Field::DeliveryAddress,
        Field::PhoneNumber,
        Field::Name,
        Field::University,
    ],
    coordinates: &[
        (150.0, 423.0),
        (150.0, 463.0),
        (150.0, 503.0),
        (150.0, 538.0),
        (150.0, 575.0),
    ],
    default_template: "ISIC.pdf",
};

static ITIC: CardSchema = CardSchema {
    fields: &[
        Field::LastFourDigits,
        Field::DeliveryAddress,
        Field::PhoneNumber,
        Field::Name,
        Field::University,
    ],
    coordinates: &[
        (150.0, 423.0),
        (150.0, 463.0),
        (150.0, 503.0),
        (150.0, 538.0),
        (150.0, 575.0),
    ],
    default_template: "ITIC.pdf",
};

static IYTC: CardSchema = CardSchema {
    fields: &[
        Field::LastFourDigits,
        Field::DeliveryAddress,
        Field::PhoneNumber,
        Field::Name,
    ],
    coordinates: &[
        (150.0, 463.0),
        (150.0, 503.0),
        (150.0, 538.0),
        (150.0, 575.0),
    ],
    default_template: "IYTC.pdf",
};

static A4: CardSchema = CardSchema {
    fields: &[
        Field::Name,
        Field::PhoneNumber,
        Field::LastFourDigits,
        Field::DeliveryAddress,
    ],
    coordinates: &[
        (195.0, 340.0),
        (195.0, 380.0),
        (195.0, 415.0),
        (195.0, 450.0),
    ],
    default_template: "cardcollection.pdf",
};

// The card-collection layout shares the IYTC field sequence, so it
// carries the same coordinates for the fallback path.
static CARD_COLLECTION: CardSchema = CardSchema {
    fields: &[
        Field::LastFourDigits,
        Field::DeliveryAddress,
        Field::PhoneNumber,
        Field::Name,
    ],
    coordinates: &[
        (150.0, 463.0),
        (150.0, 503.0),
        (150.0, 538.0),
        (150.0, 575.0),
    ],
    default_template: "cardcollection.pdf",
};

pub fn schema_for(card_type: CardType) -> &'static CardSchema {
    match card_type {
        CardType::Platinum => &PLATINUM,
        CardType::Corporate => &CORPORATE,
        CardType::Business => &BUSINESS,
        CardType::Isic => &ISIC,
        CardType::Itic => &ITIC,
        CardType::Iytc => &IYTC,
        CardType::A4 => &A4,
        CardType::CardCollection => &CARD_COLLECTION,
    }
}
