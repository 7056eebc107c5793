//! Request grammar and response envelope
//!
//! Requests are comma-separated text, the first field naming the command.
//! Responses are JSON objects of the form
//! `{"Status-code": 203, "ReasonPhrase": "...", "Data": {...}}`.

use crate::model::{Badge, HotelSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FIELD_SEPARATOR: char = ',';
const SCORE_SEPARATOR: char = '.';

/// A decoded client request.
///
/// Score fields stay textual here; deciding whether they are well-formed
/// integers in range is part of review validation and has its own status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        username: String,
        password: String,
    },
    Login {
        username: String,
        password: String,
    },
    Logout {
        username: String,
    },
    SearchHotel {
        name: String,
        city: String,
    },
    SearchAllHotels {
        city: String,
    },
    InsertReview {
        username: String,
        hotel: String,
        city: String,
        global_score: String,
        single_scores: Vec<String>,
    },
    ShowMyBadge {
        username: String,
    },
    /// Unknown command, or a known one with missing fields
    Invalid {
        command: String,
    },
}

impl Request {
    /// Parses one request payload. Empty fields, trailing ones included, are kept.
    pub fn parse(message: &str) -> Self {
        let fields: Vec<&str> = message.split(FIELD_SEPARATOR).collect();
        let command = fields[0];
        let field = |index: usize| fields.get(index).map(|value| value.to_string());

        let parsed = match command {
            "register" => field(1).zip(field(2)).map(|(username, password)| Request::Register {
                username,
                password,
            }),
            "login" => field(1).zip(field(2)).map(|(username, password)| Request::Login {
                username,
                password,
            }),
            "logout" => field(1).map(|username| Request::Logout { username }),
            "searchHotel" => field(1)
                .zip(field(2))
                .map(|(name, city)| Request::SearchHotel { name, city }),
            "searchAllHotels" => field(1).map(|city| Request::SearchAllHotels { city }),
            "insertReview" => match (field(1), field(2), field(3), field(4), fields.get(5)) {
                (Some(username), Some(hotel), Some(city), Some(global_score), Some(scores)) => {
                    Some(Request::InsertReview {
                        username,
                        hotel,
                        city,
                        global_score,
                        single_scores: scores
                            .split(SCORE_SEPARATOR)
                            .map(str::to_string)
                            .collect(),
                    })
                }
                _ => None,
            },
            "showMyBadge" => field(1).map(|username| Request::ShowMyBadge { username }),
            _ => None,
        };

        parsed.unwrap_or_else(|| Request::Invalid {
            command: command.to_string(),
        })
    }
}

/// Every outcome the server can report, one variant per status code
#[derive(Debug, Clone, PartialEq)]
pub enum ServerResponse {
    RegisterSuccess,
    LoginSuccess,
    LogoutSuccess,
    HotelFound(HotelSummary),
    AllHotels(Vec<HotelSummary>),
    ReviewInserted,
    Badge(Badge),

    UsernameExists,
    InvalidUsername,
    InvalidPassword,
    AlreadyLoggedIn,
    UnknownUsername,
    WrongPassword,
    LogoutNotLoggedIn,
    HotelSearchCityNotFound,
    HotelNotInCity,
    AllHotelsCityNotFound,
    ReviewNotLoggedIn,
    ReviewNoSession,
    ReviewCityNotFound,
    ReviewHotelNotFound,
    GlobalScoreOutOfRange,
    GlobalScoreNotInteger,
    WrongScoreCount,
    ScoreNotInteger,
    ScoreOutOfRange,
    ReviewTooSoon,
    BadgeNotLoggedIn,
    BadgeNoSession,
    BadgeUnknownUser,

    InvalidRequest,
}

impl ServerResponse {
    pub fn code(&self) -> u16 {
        match self {
            ServerResponse::RegisterSuccess => 200,
            ServerResponse::LoginSuccess => 201,
            ServerResponse::LogoutSuccess => 202,
            ServerResponse::HotelFound(_) => 203,
            ServerResponse::AllHotels(_) => 204,
            ServerResponse::ReviewInserted => 205,
            ServerResponse::Badge(_) => 206,
            ServerResponse::UsernameExists => 400,
            ServerResponse::InvalidUsername => 401,
            ServerResponse::InvalidPassword => 402,
            ServerResponse::AlreadyLoggedIn => 403,
            ServerResponse::UnknownUsername => 404,
            ServerResponse::WrongPassword => 405,
            ServerResponse::LogoutNotLoggedIn => 406,
            ServerResponse::HotelSearchCityNotFound => 407,
            ServerResponse::HotelNotInCity => 408,
            ServerResponse::AllHotelsCityNotFound => 409,
            ServerResponse::ReviewNotLoggedIn => 410,
            ServerResponse::ReviewNoSession => 411,
            ServerResponse::ReviewCityNotFound => 412,
            ServerResponse::ReviewHotelNotFound => 413,
            ServerResponse::GlobalScoreOutOfRange => 414,
            ServerResponse::GlobalScoreNotInteger => 415,
            ServerResponse::WrongScoreCount => 416,
            ServerResponse::ScoreNotInteger => 417,
            ServerResponse::ScoreOutOfRange => 418,
            ServerResponse::ReviewTooSoon => 419,
            ServerResponse::BadgeNotLoggedIn => 420,
            ServerResponse::BadgeNoSession => 421,
            ServerResponse::BadgeUnknownUser => 422,
            ServerResponse::InvalidRequest => 500,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            ServerResponse::RegisterSuccess => "Registration successful",
            ServerResponse::LoginSuccess => "Login successful",
            ServerResponse::LogoutSuccess => "Logout successful",
            ServerResponse::HotelFound(_) => "Hotel search successful",
            ServerResponse::AllHotels(_) => "Search of all hotels successful",
            ServerResponse::ReviewInserted => "Review inserted successfully",
            ServerResponse::Badge(_) => "Badge shown successfully",
            ServerResponse::UsernameExists => "Registration failed: username already exists",
            ServerResponse::InvalidUsername => {
                "Registration failed: invalid username. It cannot contain spaces or be empty"
            }
            ServerResponse::InvalidPassword => {
                "Registration failed: invalid password. It needs at least one lowercase letter, \
                 one uppercase letter and one digit, 8 to 16 characters, and no spaces"
            }
            ServerResponse::AlreadyLoggedIn => "Login failed: user already logged in",
            ServerResponse::UnknownUsername => "Login failed: unknown username, register first",
            ServerResponse::WrongPassword => "Login failed: wrong password",
            ServerResponse::LogoutNotLoggedIn => "Logout failed: not logged in",
            ServerResponse::HotelSearchCityNotFound => {
                "Hotel search failed: the requested city does not exist"
            }
            ServerResponse::HotelNotInCity => {
                "Hotel search failed: no such hotel in this city"
            }
            ServerResponse::AllHotelsCityNotFound => {
                "Search of all hotels failed: no hotels for this city"
            }
            ServerResponse::ReviewNotLoggedIn => {
                "Review insertion failed: user not logged in (server check)"
            }
            ServerResponse::ReviewNoSession => {
                "Review insertion failed: user not logged in (client check)"
            }
            ServerResponse::ReviewCityNotFound => "Review insertion failed: city not found",
            ServerResponse::ReviewHotelNotFound => {
                "Review insertion failed: hotel not found in that city"
            }
            ServerResponse::GlobalScoreOutOfRange => {
                "Review insertion failed: global score must be between 0 and 5"
            }
            ServerResponse::GlobalScoreNotInteger => {
                "Review insertion failed: global score must be an integer"
            }
            ServerResponse::WrongScoreCount => {
                "Review insertion failed: exactly 4 category scores are required"
            }
            ServerResponse::ScoreNotInteger => {
                "Review insertion failed: category scores must all be integers"
            }
            ServerResponse::ScoreOutOfRange => {
                "Review insertion failed: category scores must all be between 0 and 5"
            }
            ServerResponse::ReviewTooSoon => {
                "Review insertion failed: not enough time has passed since your last review \
                 of this hotel, try again shortly"
            }
            ServerResponse::BadgeNotLoggedIn => {
                "Badge lookup failed: user not logged in (server check)"
            }
            ServerResponse::BadgeNoSession => {
                "Badge lookup failed: user not logged in (client check)"
            }
            ServerResponse::BadgeUnknownUser => {
                "Badge lookup failed: user not registered (server check)"
            }
            ServerResponse::InvalidRequest => "Invalid request: unknown request code",
        }
    }

    /// Payload carried under `"Data"`, if any
    pub fn data(&self) -> Option<Value> {
        match self {
            ServerResponse::HotelFound(hotel) => serde_json::to_value(hotel).ok(),
            ServerResponse::AllHotels(hotels) => Some(json!({ "hotels": hotels })),
            ServerResponse::Badge(badge) => Some(json!({ "level": badge.label() })),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            status_code: self.code(),
            reason_phrase: self.reason_phrase().to_string(),
            data: self.data(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.envelope())
    }
}

/// Wire shape of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Status-code")]
    pub status_code: u16,
    #[serde(rename = "ReasonPhrase")]
    pub reason_phrase: String,
    #[serde(rename = "Data", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
