//! Built-in reference data
//!
//! A representative industry and risk vocabulary with NAICS/SIC/MCC codes.
//! Used for seeding stores, tests and deployments without their own tables.

use crate::index::IndexSnapshot;
use kyb_domain::{
    ClassificationCode, CodeType, Industry, Keyword, RiskCategory, RiskKeyword, RiskSeverity,
};

struct IndustrySeed {
    id: u32,
    name: &'static str,
    category: &'static str,
    keywords: &'static [(&'static str, f64, &'static [&'static str])],
    codes: [(&'static str, &'static str); 3],
}

// codes are (NAICS, SIC, MCC)
const INDUSTRIES: &[IndustrySeed] = &[
    IndustrySeed {
        id: 1,
        name: "Coffee Shop",
        category: "Food & Beverage",
        keywords: &[
            ("coffee shop", 0.95, &["coffee house", "coffeehouse", "coffee bar"]),
            ("coffee", 0.85, &[]),
            ("cafe", 0.85, &["café", "caffe"]),
            ("espresso", 0.9, &["latte", "cappuccino"]),
            ("barista", 0.85, &[]),
        ],
        codes: [
            ("722515", "Snack and Nonalcoholic Beverage Bars"),
            ("5812", "Eating Places"),
            ("5814", "Fast Food Restaurants"),
        ],
    },
    IndustrySeed {
        id: 2,
        name: "Restaurant",
        category: "Food & Beverage",
        keywords: &[
            ("restaurant", 0.9, &["eatery", "bistro", "diner", "trattoria"]),
            ("dining", 0.7, &[]),
            ("chef", 0.7, &[]),
            ("takeout", 0.65, &["take out", "takeaway"]),
            ("menu", 0.5, &[]),
        ],
        codes: [
            ("722511", "Full-Service Restaurants"),
            ("5812", "Eating Places"),
            ("5812", "Eating Places and Restaurants"),
        ],
    },
    IndustrySeed {
        id: 3,
        name: "Bakery",
        category: "Food & Beverage",
        keywords: &[
            ("bakery", 0.95, &["bakeshop", "bake shop"]),
            ("pastries", 0.7, &["pastry", "croissants"]),
            ("bread", 0.65, &["sourdough"]),
            ("cakes", 0.65, &["cupcakes"]),
        ],
        codes: [
            ("311811", "Retail Bakeries"),
            ("5461", "Retail Bakeries"),
            ("5462", "Bakeries"),
        ],
    },
    IndustrySeed {
        id: 4,
        name: "Software Development",
        category: "Technology",
        keywords: &[
            ("software", 0.85, &["saas"]),
            ("software development", 0.95, &["app development", "web development"]),
            ("programming", 0.8, &["coding"]),
            ("developers", 0.65, &["engineers"]),
            ("cloud", 0.55, &[]),
        ],
        codes: [
            ("541511", "Custom Computer Programming Services"),
            ("7371", "Computer Programming Services"),
            ("7372", "Computer Programming, Data Processing"),
        ],
    },
    IndustrySeed {
        id: 5,
        name: "Grocery Store",
        category: "Retail",
        keywords: &[
            ("grocery", 0.9, &["groceries", "supermarket", "grocer"]),
            ("convenience store", 0.85, &["corner store", "bodega"]),
            ("produce", 0.6, &[]),
        ],
        codes: [
            ("445110", "Supermarkets and Other Grocery Retailers"),
            ("5411", "Grocery Stores"),
            ("5411", "Grocery Stores, Supermarkets"),
        ],
    },
    IndustrySeed {
        id: 6,
        name: "Banking & Lending",
        category: "Financial Services",
        keywords: &[
            ("bank", 0.85, &["banking"]),
            ("credit union", 0.9, &[]),
            ("loans", 0.75, &["lending", "lender"]),
            ("mortgage", 0.8, &["mortgages"]),
        ],
        codes: [
            ("522110", "Commercial Banking"),
            ("6021", "National Commercial Banks"),
            ("6012", "Financial Institutions"),
        ],
    },
    IndustrySeed {
        id: 7,
        name: "Casino & Gambling",
        category: "Entertainment",
        keywords: &[
            ("casino", 0.95, &[]),
            ("gambling", 0.9, &["betting", "wagering"]),
            ("sportsbook", 0.9, &["bookmaker"]),
            ("poker", 0.8, &[]),
            ("slot machines", 0.8, &["slots"]),
            ("lottery", 0.75, &[]),
        ],
        codes: [
            ("713210", "Casinos (except Casino Hotels)"),
            ("7999", "Amusement and Recreation Services"),
            ("7995", "Betting, Casino Gambling"),
        ],
    },
    IndustrySeed {
        id: 8,
        name: "Trucking & Freight",
        category: "Transportation",
        keywords: &[
            ("trucking", 0.9, &["truckload"]),
            ("freight", 0.85, &["cargo"]),
            ("logistics", 0.7, &[]),
            ("hauling", 0.75, &["haulage"]),
        ],
        codes: [
            ("484121", "General Freight Trucking, Long-Distance, Truckload"),
            ("4213", "Trucking, Except Local"),
            ("4214", "Motor Freight Carriers and Trucking"),
        ],
    },
    IndustrySeed {
        id: 9,
        name: "Legal Services",
        category: "Professional Services",
        keywords: &[
            ("law firm", 0.95, &["legal counsel"]),
            ("attorney", 0.85, &["attorneys", "lawyer", "lawyers"]),
            ("litigation", 0.8, &[]),
            ("legal", 0.55, &[]),
        ],
        codes: [
            ("541110", "Offices of Lawyers"),
            ("8111", "Legal Services"),
            ("8111", "Legal Services, Attorneys"),
        ],
    },
    IndustrySeed {
        id: 10,
        name: "Construction",
        category: "Construction",
        keywords: &[
            ("construction", 0.85, &[]),
            ("general contractor", 0.9, &["contractor", "contractors"]),
            ("renovation", 0.75, &["remodeling", "remodelling"]),
            ("roofing", 0.8, &[]),
        ],
        codes: [
            ("236220", "Commercial and Institutional Building Construction"),
            ("1542", "General Contractors-Nonresidential Buildings"),
            ("1520", "General Contractors-Residential and Commercial"),
        ],
    },
    IndustrySeed {
        id: 11,
        name: "Medical Practice",
        category: "Healthcare",
        keywords: &[
            ("clinic", 0.8, &["medical center"]),
            ("physician", 0.85, &["physicians", "doctor", "doctors"]),
            ("healthcare", 0.7, &["health care"]),
            ("patients", 0.55, &[]),
        ],
        codes: [
            ("621111", "Offices of Physicians (except Mental Health Specialists)"),
            ("8011", "Offices and Clinics of Doctors of Medicine"),
            ("8011", "Doctors and Physicians"),
        ],
    },
    IndustrySeed {
        id: 12,
        name: "Auto Repair",
        category: "Automotive",
        keywords: &[
            ("auto repair", 0.95, &["car repair", "mechanic"]),
            ("oil change", 0.85, &[]),
            ("collision", 0.75, &["body shop"]),
            ("brakes", 0.65, &["tires"]),
        ],
        codes: [
            ("811111", "General Automotive Repair"),
            ("7538", "General Automotive Repair Shops"),
            ("7538", "Automotive Service Shops"),
        ],
    },
    IndustrySeed {
        id: 13,
        name: "Hotel & Lodging",
        category: "Hospitality",
        keywords: &[
            ("hotel", 0.9, &["motel", "inn"]),
            ("bed and breakfast", 0.9, &["b&b"]),
            ("lodging", 0.8, &["accommodation"]),
            ("resort", 0.8, &[]),
        ],
        codes: [
            ("721110", "Hotels (except Casino Hotels) and Motels"),
            ("7011", "Hotels and Motels"),
            ("7011", "Lodging, Hotels, Motels, Resorts"),
        ],
    },
    IndustrySeed {
        id: 14,
        name: "Real Estate",
        category: "Real Estate",
        keywords: &[
            ("real estate", 0.9, &["realty", "realtor"]),
            ("property management", 0.85, &[]),
            ("rentals", 0.55, &["leasing"]),
        ],
        codes: [
            ("531210", "Offices of Real Estate Agents and Brokers"),
            ("6531", "Real Estate Agents and Managers"),
            ("6513", "Real Estate Agents and Managers, Rentals"),
        ],
    },
    IndustrySeed {
        id: 15,
        name: "Cannabis Dispensary",
        category: "Retail",
        keywords: &[
            ("cannabis", 0.95, &["marijuana"]),
            ("dispensary", 0.9, &[]),
            ("cbd", 0.75, &[]),
            ("thc", 0.8, &[]),
        ],
        codes: [
            ("459991", "Tobacco, Electronic Cigarette, and Other Smoking Supplies Retailers"),
            ("5999", "Retail Stores, Not Elsewhere Classified"),
            ("5999", "Miscellaneous and Specialty Retail Stores"),
        ],
    },
];

fn industries() -> (Vec<Industry>, Vec<Keyword>, Vec<ClassificationCode>) {
    let mut industries = Vec::new();
    let mut keywords = Vec::new();
    let mut codes = Vec::new();
    let mut next_keyword = 1;

    for seed in INDUSTRIES {
        industries.push(Industry::new(seed.id, seed.name, seed.category));

        for (text, weight, synonyms) in seed.keywords {
            keywords.push(
                Keyword::new(next_keyword, seed.id, *text, *weight)
                    .with_synonyms(synonyms.iter().copied()),
            );
            next_keyword += 1;
        }

        let [(naics, naics_desc), (sic, sic_desc), (mcc, mcc_desc)] = seed.codes;
        codes.push(ClassificationCode::new(seed.id, CodeType::Naics, naics, naics_desc));
        codes.push(ClassificationCode::new(seed.id, CodeType::Sic, sic, sic_desc));
        codes.push(ClassificationCode::new(seed.id, CodeType::Mcc, mcc, mcc_desc));
    }

    (industries, keywords, codes)
}

fn risk_keywords() -> Vec<RiskKeyword> {
    use RiskCategory::*;
    use RiskSeverity::*;

    vec![
        // illegal
        RiskKeyword::new(1, "drug trafficking", Illegal, Critical)
            .with_synonyms(["narcotics distribution", "drug dealing"]),
        RiskKeyword::new(2, "counterfeit", Illegal, High)
            .with_synonyms(["counterfeits", "knockoffs", "replica designer"]),
        RiskKeyword::new(3, "weapons smuggling", Illegal, Critical)
            .with_synonyms(["arms trafficking", "gun running"]),
        RiskKeyword::new(4, "money laundering", Illegal, Critical)
            .with_pattern(r"\blaunder(ing|ed)?\s+(\w+\s+)?(money|funds|proceeds)\b"),
        RiskKeyword::new(5, "fake ids", Illegal, Critical)
            .with_synonyms(["fake identification", "forged documents"]),
        // prohibited
        RiskKeyword::new(6, "gambling", Prohibited, High)
            .with_synonyms(["betting", "wagering", "casino", "sportsbook"])
            .restricting(CodeType::Mcc, "7995")
            .restricting(CodeType::Naics, "713210"),
        RiskKeyword::new(7, "adult entertainment", Prohibited, High)
            .with_synonyms(["pornography", "adult content", "escort service"])
            .restricting(CodeType::Mcc, "5967"),
        RiskKeyword::new(8, "online pharmacy", Prohibited, High)
            .with_synonyms(["prescription drugs without prescription"])
            .restricting(CodeType::Mcc, "5912"),
        // high risk
        RiskKeyword::new(9, "cryptocurrency", HighRisk, Medium)
            .with_synonyms(["crypto", "bitcoin", "digital assets"]),
        RiskKeyword::new(10, "payday loan", HighRisk, Medium)
            .with_synonyms(["payday loans", "cash advance"]),
        RiskKeyword::new(11, "cannabis", HighRisk, High)
            .with_synonyms(["marijuana", "thc"]),
        RiskKeyword::new(12, "firearms", HighRisk, High)
            .with_synonyms(["guns", "ammunition"]),
        RiskKeyword::new(13, "debt collection", HighRisk, Low),
        // trade-based money laundering
        RiskKeyword::new(14, "over invoicing", Tbml, High)
            .with_synonyms(["overinvoicing", "inflated invoices"]),
        RiskKeyword::new(15, "under invoicing", Tbml, High)
            .with_synonyms(["underinvoicing"]),
        RiskKeyword::new(16, "phantom shipment", Tbml, Critical)
            .with_synonyms(["phantom shipments"]),
        // sanctions
        RiskKeyword::new(17, "north korea", Sanctions, Critical)
            .with_synonyms(["dprk", "pyongyang"]),
        RiskKeyword::new(18, "iran", Sanctions, Critical).with_synonyms(["tehran"]),
        RiskKeyword::new(19, "syria", Sanctions, Critical).with_synonyms(["damascus"]),
        RiskKeyword::new(20, "crimea", Sanctions, Critical),
        RiskKeyword::new(21, "sanctions evasion", Sanctions, Critical),
        // fraud
        RiskKeyword::new(22, "ponzi", Fraud, Critical)
            .with_synonyms(["pyramid scheme"]),
        RiskKeyword::new(23, "guaranteed returns", Fraud, High)
            .with_pattern(r"\bguaranteed\s+(\w+\s+)?(returns|profits?)\b"),
        RiskKeyword::new(24, "identity theft", Fraud, Critical),
        // suspicious
        RiskKeyword::new(25, "offshore", Suspicious, Medium),
        RiskKeyword::new(26, "nominee", Suspicious, Medium)
            .with_synonyms(["nominee director", "nominee shareholders"]),
        RiskKeyword::new(27, "cash only", Suspicious, Low)
            .with_synonyms(["cash business", "cash intensive"]),
        RiskKeyword::new(28, "shell company", Suspicious, High)
            .with_synonyms(["shell corporation", "shell companies"]),
        RiskKeyword::new(29, "bearer shares", Suspicious, High),
        RiskKeyword::new(30, "no questions asked", Suspicious, Medium),
    ]
}

/// The built-in reference snapshot
pub fn reference_snapshot() -> IndexSnapshot {
    let (industries, keywords, codes) = industries();
    let mut snapshot = IndexSnapshot {
        industries,
        keywords,
        risk_keywords: risk_keywords(),
        codes,
    };
    snapshot.canonicalize();
    snapshot
}
