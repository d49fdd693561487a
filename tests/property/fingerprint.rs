//! Properties of request fingerprints and related pure helpers

use examforge::cache::Fingerprint;
use examforge::company::{normalize, CompanyTable};
use examforge::config::SectionWeight;
use examforge::stage::generation::plan_chunks;
use examforge::stage::prompt::allocate_sections;
use examforge::GenerationRequest;
use proptest::prelude::*;

fn company_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 &.+-]{0,28}[A-Za-z0-9]"
}

proptest! {
    #[test]
    fn fingerprint_is_deterministic(company in company_name(), year in 2000u16..2100, count in 1u32..=100) {
        let a = Fingerprint::from_parts(&company, year, count);
        let b = Fingerprint::from_parts(&company, year, count);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn fingerprint_separates_fields(company in company_name(), year in 2000u16..2099, count in 1u32..100) {
        let base = Fingerprint::from_parts(&company, year, count);
        prop_assert_ne!(base, Fingerprint::from_parts(&company, year + 1, count));
        prop_assert_ne!(base, Fingerprint::from_parts(&company, year, count + 1));
    }

    #[test]
    fn force_flag_never_changes_fingerprint(company in company_name(), count in 1u32..=100) {
        let table = CompanyTable::builtin().unwrap();
        let plain = GenerationRequest::new(&company, 2025, count, table).unwrap();
        let forced = plain.clone().with_force_regenerate(true);
        prop_assert_eq!(plain.fingerprint(), forced.fingerprint());
    }

    #[test]
    fn case_and_spacing_do_not_change_fingerprint(company in "[a-z]{2,12}( [a-z]{2,12}){0,2}") {
        let table = CompanyTable::builtin().unwrap();
        let shouted = format!("  {}  ", company.to_uppercase().replace(' ', "   "));
        let a = GenerationRequest::new(&company, 2025, 10, table).unwrap();
        let b = GenerationRequest::new(&shouted, 2025, 10, table).unwrap();
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn normalize_is_idempotent(raw in "[A-Za-z0-9 \\t&.\u{FF21}-\u{FF3A}-]{0,40}") {
        let once = normalize(&raw);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn section_allocation_sums_to_count(count in 1u32..=100, a in 1u32..98) {
        let b = (100 - a) / 2;
        let c = 100 - a - b;
        let weights = vec![
            SectionWeight::new("Quant", a),
            SectionWeight::new("Logical", b),
            SectionWeight::new("Verbal", c),
        ];
        let allocations = allocate_sections(count, &weights);
        prop_assert_eq!(allocations.iter().map(|s| s.count).sum::<u32>(), count);
    }

    #[test]
    fn chunks_cover_count_within_size(count in 1u32..=100) {
        let chunks = plan_chunks(count, 15, 8);
        prop_assert_eq!(chunks.iter().sum::<u32>(), count);
        if count > 15 {
            prop_assert!(chunks.iter().all(|&c| c <= 8));
            let (min, max) = (chunks.iter().min().unwrap(), chunks.iter().max().unwrap());
            prop_assert!(max - min <= 1);
        }
    }
}
