use crate::config::Config;
use crate::{print_json, CliError};
use aiv::{
    Candidate, CancelToken, ElectionKeys, ExclusionList, RecordDecoder, TallyConfig, TallyEngine,
};

/// Authority: count the ballots of one election object in a ledger dump
pub fn command_tally(matches: &clap::ArgMatches, config: &Config) -> Result<(), CliError> {
    let object_id = matches.value_of("OBJECT-ID").unwrap_or_default();
    let keys = ElectionKeys::from_stored(&config.election_keys()?)?;
    let ledger = config.ledger()?;

    let exclusions: ExclusionList = matches
        .values_of("exclude")
        .map(|values| values.collect())
        .unwrap_or_default();

    let mut engine = TallyEngine::for_keys(&keys).with_config(TallyConfig {
        package: matches.value_of("package").map(str::to_owned),
        ..TallyConfig::default()
    });
    if let Some(ids) = matches.values_of("candidate") {
        let candidates: Vec<Candidate> = ids.map(|id| Candidate::new(id, id)).collect();
        engine = engine.with_candidates(&candidates);
    }

    let result = engine.run(
        &ledger,
        &RecordDecoder,
        object_id,
        &exclusions,
        &CancelToken::new(),
    )?;
    print_json(&result)
}
