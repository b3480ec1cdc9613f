//! Static NFL team directory.

use crate::models::TeamInfo;

const TEAMS: &[(&str, &str, &str)] = &[
    ("ARI", "Cardinals", "Arizona"),
    ("ATL", "Falcons", "Atlanta"),
    ("BAL", "Ravens", "Baltimore"),
    ("BUF", "Bills", "Buffalo"),
    ("CAR", "Panthers", "Carolina"),
    ("CHI", "Bears", "Chicago"),
    ("CIN", "Bengals", "Cincinnati"),
    ("CLE", "Browns", "Cleveland"),
    ("DAL", "Cowboys", "Dallas"),
    ("DEN", "Broncos", "Denver"),
    ("DET", "Lions", "Detroit"),
    ("GB", "Packers", "Green Bay"),
    ("HOU", "Texans", "Houston"),
    ("IND", "Colts", "Indianapolis"),
    ("JAX", "Jaguars", "Jacksonville"),
    ("KC", "Chiefs", "Kansas City"),
    ("LAC", "Chargers", "Los Angeles"),
    ("LAR", "Rams", "Los Angeles"),
    ("LV", "Raiders", "Las Vegas"),
    ("LVR", "Raiders", "Las Vegas"),
    ("MIA", "Dolphins", "Miami"),
    ("MIN", "Vikings", "Minnesota"),
    ("NE", "Patriots", "New England"),
    ("NO", "Saints", "New Orleans"),
    ("NYG", "Giants", "New York"),
    ("NYJ", "Jets", "New York"),
    ("PHI", "Eagles", "Philadelphia"),
    ("PIT", "Steelers", "Pittsburgh"),
    ("SEA", "Seahawks", "Seattle"),
    ("SF", "49ers", "San Francisco"),
    ("TB", "Buccaneers", "Tampa Bay"),
    ("TEN", "Titans", "Tennessee"),
    ("WAS", "Commanders", "Washington"),
];

/// Resolve a team code (case-insensitive). Never fails: unknown codes come
/// back as a placeholder that uses the code as its name and location.
pub fn lookup(code: &str) -> TeamInfo {
    let upper = code.trim().to_uppercase();
    if upper.is_empty() {
        return TeamInfo {
            code: String::new(),
            name: "Unknown".to_string(),
            location: "Unknown".to_string(),
        };
    }

    match TEAMS.iter().find(|(c, _, _)| *c == upper) {
        Some((code, name, location)) => TeamInfo {
            code: code.to_string(),
            name: name.to_string(),
            location: location.to_string(),
        },
        None => TeamInfo {
            code: upper.clone(),
            name: upper.clone(),
            location: upper,
        },
    }
}
