//! Keyword intent parser.
//!
//! Parameters are pulled out of the question first, independently of which rule ends up
//! matching. Rules are then tried in table order: a rule applies when every keyword group has
//! at least one alternative in the (lower-cased, accent-folded) question, and its builder may
//! still decline when a parameter it needs is absent. The first rule that builds an intent wins,
//! so more specific rules sit above the generic ones.

use once_cell::sync::Lazy;
use regex::Regex;
use residencias_core::parse::fold_text;
use tracing::debug;

use crate::intent::Intent;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static FACILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(residencia|centro|facility)\s+(\d+)\b").unwrap());
static FOUNDATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfundacion\s+(\w+)").unwrap());
static PROVIDER_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:con|with|from)\s+(?:el proveedor\s+|the provider\s+)?(.+?)\s+(?:en|in)\s+\d{4}\b")
        .unwrap()
});
static PROVIDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:con|with|from)\s+(?:el proveedor\s+|the provider\s+)?(.+)$").unwrap()
});
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:del|entre|from|between)\s+(\d\S*)\s+(?:al|hasta|y|to|and)\s+(\d\S*)").unwrap()
});
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:mayor a|mayor de|mayor que|greater than|more than|above|over)\s+([€$]?\s?-?\d[\d.,]*\s?[€$]?)",
    )
    .unwrap()
});
static CUTOFF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:vencen|vence|expire|expiring|expires)\s+(?:antes de|before)\s+(\d\S*)")
        .unwrap()
});
static LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btop\s+(\d+)\b").unwrap());

/// Everything the parser could read out of a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub year: Option<i32>,
    pub facility: Option<String>,
    pub provider: Option<String>,
    pub range: Option<(String, String)>,
    pub amount: Option<String>,
    pub cutoff: Option<String>,
    pub limit: Option<usize>,
}

struct Rule {
    keywords: &'static [&'static [&'static str]],
    build: fn(&Extracted) -> Option<Intent>,
}

const INVOICE: &[&str] = &["factura", "invoice"];
const CONTRACT: &[&str] = &["contrato", "contract"];
const SPEND: &[&str] = &[
    "gast", "spend", "spent", "factur", "invoice", "pay", "paid", "pag",
];

static RULES: &[Rule] = &[
    Rule {
        keywords: &[
            INVOICE,
            &["mayor a", "mayor de", "mayor que", "greater than", "more than", "above", "over "],
        ],
        build: |x| {
            Some(Intent::InvoicesAboveAmount {
                amount: x.amount.clone(),
            })
        },
    },
    Rule {
        keywords: &[
            &["proveedor", "provider"],
            &["mas contratos", "most contracts", "more contracts"],
        ],
        build: |_| Some(Intent::ProviderWithMostContracts),
    },
    Rule {
        keywords: &[
            INVOICE,
            &["mas reciente", "ultima", "latest", "most recent", "newest", "last"],
        ],
        build: |_| Some(Intent::MostRecentInvoice),
    },
    Rule {
        keywords: &[&["del", "entre", "from", "between"]],
        build: |x| {
            x.range.clone().map(|(start, end)| Intent::SpendInRange {
                start: Some(start),
                end: Some(end),
            })
        },
    },
    Rule {
        keywords: &[CONTRACT, &["venc", "expir"]],
        build: |x| {
            x.cutoff.clone().map(|cutoff| Intent::ContractsExpiringBefore {
                cutoff: Some(cutoff),
            })
        },
    },
    Rule {
        keywords: &[&["top"], INVOICE],
        build: |x| {
            Some(Intent::TopInvoices {
                limit: x.limit,
                year: x.year,
            })
        },
    },
    Rule {
        keywords: &[
            &[
                "residencias",
                "centros",
                "facilities",
                "by facility",
                "per facility",
                "por residencia",
                "por centro",
            ],
            &["ranking", "gasto", "gastan", "spend", "spent", "most", "mas"],
        ],
        build: |x| Some(Intent::FacilitySpendRanking { year: x.year }),
    },
    Rule {
        keywords: &[
            INVOICE,
            &["mayor", "mas alta", "mas cara", "largest", "biggest", "highest"],
        ],
        build: |x| Some(Intent::LargestInvoice { year: x.year }),
    },
    Rule {
        keywords: &[
            &["proveedores", "providers"],
            &["ranking", "gasto", "gastamos", "spend", "spent", "most", "mas"],
        ],
        build: |x| {
            Some(Intent::ProviderSpendRanking {
                facility: x.facility.clone(),
                year: x.year,
            })
        },
    },
    Rule {
        keywords: &[&["residencia", "centro"], &["gast"], &["mas"]],
        build: |x| match x.facility {
            Some(_) => None,
            None => Some(Intent::FacilitySpendRanking { year: x.year }),
        },
    },
    Rule {
        keywords: &[&["concepto", "concept", "categoria", "category"]],
        build: |x| Some(Intent::ConceptRanking { year: x.year }),
    },
    Rule {
        keywords: &[&[
            "por mes",
            "cada mes",
            "mensual",
            "monthly",
            "per month",
            "by month",
            "each month",
        ]],
        build: |x| Some(Intent::MonthlySpend { year: x.year }),
    },
    Rule {
        keywords: &[&["residencia", "centro", "facility", "fundacion"]],
        build: |x| {
            x.facility.clone().map(|facility| Intent::FacilitySummary {
                facility: Some(facility),
                year: x.year,
            })
        },
    },
    Rule {
        keywords: &[CONTRACT],
        build: |x| {
            x.provider.clone().map(|provider| Intent::ProviderContracts {
                provider: Some(provider),
            })
        },
    },
    Rule {
        keywords: &[SPEND],
        build: |x| {
            x.provider.clone().map(|provider| Intent::SpendWithProvider {
                provider: Some(provider),
                year: x.year,
            })
        },
    },
    Rule {
        keywords: &[&["total", "gast", "spend", "spent", "factur", "invoice"]],
        build: |x| x.year.map(|year| Intent::TotalForYear { year: Some(year) }),
    },
];

/// Maps a question to an intent, or `None` when no rule applies.
pub fn parse_question(question: &str) -> Option<Intent> {
    let text = fold_text(question);
    let extracted = extract_folded(&text);
    let intent = RULES.iter().find_map(|rule| {
        let applies = rule
            .keywords
            .iter()
            .all(|group| group.iter().any(|alt| text.contains(alt)));
        if applies {
            (rule.build)(&extracted)
        } else {
            None
        }
    });
    debug!(question, intent = ?intent.as_ref().map(Intent::name), "keyword parse");
    intent
}

pub fn extract(question: &str) -> Extracted {
    extract_folded(&fold_text(question))
}

fn extract_folded(text: &str) -> Extracted {
    Extracted {
        year: YEAR_RE
            .captures(text)
            .and_then(|caps| caps[1].parse().ok()),
        facility: extract_facility(text),
        provider: extract_provider(text),
        range: RANGE_RE.captures(text).map(|caps| {
            (
                trim_token(&caps[1]).to_string(),
                trim_token(&caps[2]).to_string(),
            )
        }),
        amount: AMOUNT_RE
            .captures(text)
            .map(|caps| trim_token(&caps[1]).trim().to_string()),
        cutoff: CUTOFF_RE
            .captures(text)
            .map(|caps| trim_token(&caps[1]).to_string()),
        limit: LIMIT_RE
            .captures(text)
            .and_then(|caps| caps[1].parse().ok()),
    }
}

fn extract_facility(text: &str) -> Option<String> {
    if let Some(caps) = FACILITY_RE.captures(text) {
        let kind = match &caps[1] {
            "centro" => "Centro",
            _ => "Residencia",
        };
        return Some(format!("{kind} {}", &caps[2]));
    }
    FOUNDATION_RE
        .captures(text)
        .map(|caps| format!("Fundacion {}", &caps[1]))
}

fn extract_provider(text: &str) -> Option<String> {
    let caps = PROVIDER_YEAR_RE
        .captures(text)
        .or_else(|| PROVIDER_RE.captures(text))?;
    let name = trim_token(caps[1].trim());
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn trim_token(token: &str) -> &str {
    token.trim_end_matches(['?', '!', '.', ',', ';', ':']).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(question: &str) -> Intent {
        parse_question(question).unwrap_or_else(|| panic!("no intent for {question:?}"))
    }

    #[test]
    fn provider_ranking_with_year() {
        assert_eq!(
            parsed("ranking of providers in 2024"),
            Intent::ProviderSpendRanking {
                facility: None,
                year: Some(2024)
            }
        );
    }

    #[test]
    fn amount_and_range_questions() {
        assert_eq!(
            parsed("Which invoices are greater than 1000?"),
            Intent::InvoicesAboveAmount {
                amount: Some("1000".to_string())
            }
        );
        assert_eq!(
            parsed("¿Qué facturas son mayor de 1.500,25 €?"),
            Intent::InvoicesAboveAmount {
                amount: Some("1.500,25 €".to_string())
            }
        );
        assert_eq!(
            parsed("How much did we spend from 01/01/2023 to 31/12/2023?"),
            Intent::SpendInRange {
                start: Some("01/01/2023".to_string()),
                end: Some("31/12/2023".to_string())
            }
        );
        assert_eq!(
            parsed("gasto entre 2024-01-01 y 2024-06-30"),
            Intent::SpendInRange {
                start: Some("2024-01-01".to_string()),
                end: Some("2024-06-30".to_string())
            }
        );
    }

    #[test]
    fn spanish_and_english_keywords() {
        assert_eq!(parsed("¿Cuál es la factura más reciente?"), Intent::MostRecentInvoice);
        assert_eq!(
            parsed("Which provider has the most contracts?"),
            Intent::ProviderWithMostContracts
        );
        assert_eq!(
            parsed("¿Qué contratos vencen antes de 01/01/2025?"),
            Intent::ContractsExpiringBefore {
                cutoff: Some("01/01/2025".to_string())
            }
        );
        assert_eq!(
            parsed("What is the largest invoice of 2024?"),
            Intent::LargestInvoice { year: Some(2024) }
        );
        assert_eq!(
            parsed("spend by concept"),
            Intent::ConceptRanking { year: None }
        );
        assert_eq!(
            parsed("gasto mensual en 2023"),
            Intent::MonthlySpend { year: Some(2023) }
        );
    }

    #[test]
    fn facility_and_provider_parameters() {
        assert_eq!(
            parsed("Summary of residencia 1 in 2024"),
            Intent::FacilitySummary {
                facility: Some("Residencia 1".to_string()),
                year: Some(2024)
            }
        );
        assert_eq!(
            parsed("ranking de residencias"),
            Intent::FacilitySpendRanking { year: None }
        );
        assert_eq!(
            parsed("¿Cuánto hemos gastado con Limpiezas SL en 2024?"),
            Intent::SpendWithProvider {
                provider: Some("limpiezas sl".to_string()),
                year: Some(2024)
            }
        );
        assert_eq!(
            parsed("contracts with the provider Acme"),
            Intent::ProviderContracts {
                provider: Some("acme".to_string())
            }
        );
        assert_eq!(
            parsed("top 3 invoices of 2024"),
            Intent::TopInvoices {
                limit: Some(3),
                year: Some(2024)
            }
        );
        assert_eq!(
            parsed("total spend 2024"),
            Intent::TotalForYear { year: Some(2024) }
        );
    }

    #[test]
    fn first_year_wins() {
        assert_eq!(extract("spend in 2023 and 2024").year, Some(2023));
    }

    #[test]
    fn singular_facility_spend_question_ranks_facilities() {
        assert_eq!(
            parsed("¿En qué residencia gastamos más?"),
            Intent::FacilitySpendRanking { year: None }
        );
        assert_eq!(
            parsed("¿En qué centro gastamos más en 2024?"),
            Intent::FacilitySpendRanking { year: Some(2024) }
        );
        assert_eq!(
            parsed("¿Con qué proveedores gastamos más en la residencia 2?"),
            Intent::ProviderSpendRanking {
                facility: Some("Residencia 2".to_string()),
                year: None
            }
        );
    }

    #[test]
    fn decomposed_accents_match_like_composed_ones() {
        assert_eq!(
            parsed("resumen de la fundacio\u{301}n x"),
            Intent::FacilitySummary {
                facility: Some("Fundacion x".to_string()),
                year: None
            }
        );
        assert_eq!(
            parsed("¿Cua\u{301}l es la factura ma\u{301}s reciente?"),
            Intent::MostRecentInvoice
        );
    }

    #[test]
    fn thousands_amounts_and_unreadable_thresholds() {
        assert_eq!(
            parsed("facturas mayor a 1.000 €"),
            Intent::InvoicesAboveAmount {
                amount: Some("1.000 €".to_string())
            }
        );
        assert_eq!(
            parsed("facturas mayor a mil"),
            Intent::InvoicesAboveAmount { amount: None }
        );
        assert_eq!(
            parsed("invoices greater than a lot"),
            Intent::InvoicesAboveAmount { amount: None }
        );
        assert_eq!(
            parsed("¿Cuál es la mayor factura?"),
            Intent::LargestInvoice { year: None }
        );
    }

    #[test]
    fn builders_decline_without_parameters() {
        assert_eq!(parse_question("hello there"), None);
        assert_eq!(parse_question(""), None);
    }

    proptest::proptest! {
        #[test]
        fn parsing_is_deterministic(question in "\\PC{0,80}") {
            proptest::prop_assert_eq!(parse_question(&question), parse_question(&question));
        }
    }

    #[test]
    fn malformed_dates_are_kept_for_validation() {
        assert_eq!(
            parsed("contracts expiring before 32/13/2024"),
            Intent::ContractsExpiringBefore {
                cutoff: Some("32/13/2024".to_string())
            }
        );
    }
}
