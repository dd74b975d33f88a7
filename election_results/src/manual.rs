/*!

This is the long-form manual for `election_results` and `election-day`.

## Running an import

```text
election-day --definition vote.json --entities entities-2023.json \
    --format internal --input results.csv --notify email,webhooks
```

The definition is the business (vote, election or election compound) with
its current results. The import is reconciled into it and the summary of the
business is printed, or written to `--out`. With `--export ech-0252` (votes)
or `--export party-results` (proporz elections and compounds), the export is
written instead of the summary. `--reference` compares the summary with a
reference summary and fails on any difference.

An import either succeeds completely or changes nothing: every error found in
the files is printed, with the file name and the row (the header is row 1).

## Input formats

The following formats are supported:
* `default` one CSV or Excel file per ballot of a vote
* `internal` CSV or Excel files with one row per entity (votes) or per entity
  and candidate (elections and election compounds)
* `wabsti` Wabsti exports of votes, majorz and proporz elections
* `wabstic` Wabsti-C exports of votes, majorz and proporz elections
* `sesam` SESAM exports of majorz elections
* `ech` eCH-0252 deliveries for votes and elections
* `party-results` party results of proporz elections and election compounds

CSV files may use `,`, `;` or tabs as delimiters and may be encoded in UTF-8
(with or without BOM), UTF-16 or Windows-1252. Headers are matched without
regard to case, accents and small typos. Unknown columns are ignored.

### `default`

One file per ballot, passed as `proposal=`, `counter-proposal=` and
`tie-breaker=`. A single file without key is the proposal. Each file has the
columns `ID`, `Ja Stimmen`, `Nein Stimmen`, `Stimmberechtigte`,
`Leere Stimmzettel` and `Ungültige Stimmzettel`; an entity whose counts are
`unbekannt` is not counted yet. Ballots without a file keep their results.

### `internal`

Votes: `status`, `type` (`proposal`, `counter-proposal`, `tie-breaker`),
`entity_id`, `counted`, `yeas`, `nays`, `invalid`, `empty`,
`eligible_voters` and optionally `expats`.

Elections: `election_status`, the entity columns (`entity_id`, `entity_counted`,
`entity_eligible_voters`, `entity_received_ballots`, `entity_blank_ballots`,
`entity_invalid_ballots`, `entity_blank_votes`, `entity_invalid_votes`) and
the candidate columns (`candidate_id`, `candidate_family_name`,
`candidate_first_name`, `candidate_elected`, `candidate_votes`, ...). Proporz
elections add the list columns (`list_id`, `list_name`, `list_votes`,
`list_connection`, `list_connection_parent`, ...) and optionally the
panachage columns `candidate_panachage_votes_from_list_{id}` and
`list_panachage_votes_from_list_{id}`. The blank list is `999`.

Election compounds take the election columns of proporz elections. Each row
goes to the first election of the compound whose domain contains the entity;
elections without rows are cleared.

### `wabsti`

Votes: one row per vote and entity (`Vorlage-Nr.`, `BfS-Nr.`,
`Stimmberechtigte`, `leere SZ`, `ungültige SZ`, `Ja`, `Nein`, `InitOAntw`,
the counter-proposal and tie-breaker columns and `StimmBet`). Entities with a
`StimmBet` of 0 are not counted. The vote is selected by the definition:

```json
{ "wabsti": { "number": 1 } }
```

Majorz elections: a results file (`results=`) with one row per entity and
the candidates side by side (`KandID_n`, `KandName_n`, `KandVorname_n`,
`Stimmen_n`). The pseudo candidates `Leere Zeilen` and `Ungültige Stimmen`
hold the blank and invalid votes. An optional `elected=` file lists the
elected candidates (`ID`, `Name`, `Vorname`).

Proporz elections: a results file (`results=`) with one row per entity and
candidate. The
panachage columns are headed `{list id}.{list code}`. Optional files:
`connections=` (list connections and sub-connections), `elected=` (the
elected candidates) and `statistics=` (the ballot statistics per entity).

### `wabstic`

Votes: `sg_geschaefte` and `sg_gemeinden`. Majorz: `wm_wahl`, `wmstatic_gemeinden`, `wm_gemeinden`, `wm_kandidaten`
and `wm_kandidatengde`. Proporz: `wp_wahl`, `wpstatic_gemeinden`,
`wp_gemeinden`, `wp_listen`, `wp_listengde`, `wpstatic_kandidaten`,
`wp_kandidaten` and `wp_kandidatengde`. The files are passed by name or as
`key=path`. The vote or election is selected by the `wabstiC` section of the
definition:

```json
{ "wabstiC": { "number": "1", "district": "3" } }
```

### `sesam`

One row per entity and candidate: `Anzahl Sitze`, `Wahlkreis-Nr`,
`Stimmberechtigte`, `Wahlzettel`, the blank and invalid ballots and votes,
`Kandidaten-Nr`, `Gewaehlt`, `Name`, `Vorname`, `Stimmen` and
`Anzahl Gemeinden` (`1 von 1`). `Absolutes Mehr` is optional.

### `ech`

eCH-0252 XML. Election result deliveries may be combined with the election
information delivery, which then provides the candidates, lists and list
unions. Vote deliveries hold one `countingCircleInfo` per entity.

### `party-results`

`year`, `total_votes`, `name`, `color`, `mandates`, `votes` and optionally
`id`, `voters_count`, `voters_count_percentage`, `domain`, `domain_segment`,
`name_{locale}` and `panachage_votes_from_{id}`.

## Notifications

`--notify` takes a comma separated list of `email`, `sms` and `webhooks`.
The notifications are sent in the background once the import has been
stored; a failing notification never fails the import.

*/
