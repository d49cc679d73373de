/*!

This is the long-form manual for `form_balancer` and `brandpoll`.

## How forms are balanced

Every configured form has a counter holding its number of submissions and the
last time it was handed out. When a visitor asks for a form, the form with the
fewest submissions is chosen. If several forms share the smallest count:

1. a form that was never handed out wins,
2. otherwise the form handed out longest ago wins,
3. otherwise the lowest form id wins.

With four fresh forms the first visitors therefore see forms 1, 2, 3 and 4 in
turn, and a form that collects submissions quickly is shown less until the
others catch up.

Every configured form needs a counter. When the configuration gains a form
after the last `brandpoll init`, selection fails and names the forms to
initialize, so run `brandpoll init` again.

Two visitors arriving at the same moment may be shown the same form. This is
accepted: the balancing goal is approximate fairness over time.

## Recording a submission

A submission carries the form id, an opaque session id, exactly one answer per
question (5), and two optional comments. It is rejected before anything is
written when:

* the form id is not configured,
* there are not exactly 5 answers,
* an answer is blank (the error lists the question numbers),
* the session id is blank, or an answer or session id exceeds 255 characters,
* a comment exceeds 2000 characters.

An answer that is not one of the form's names is accepted and logged as a
warning.

The submission row and the counter increment are committed in one
transaction. If the counter of the form is missing, nothing is written.

## Configuration

The default table has four forms:

| id | title         | names                                 |
|----|---------------|---------------------------------------|
| 1  | Survey Form A | Aurora, Beacon, Catalyst, Delta       |
| 2  | Survey Form B | Evergreen, Fusion, Genesis, Harmony   |
| 3  | Survey Form C | Innovate, Journey, Keystone, Legacy   |
| 4  | Survey Form D | Momentum, Nexus, Odyssey, Pinnacle    |

A different table can be given to `brandpoll` as a JSON file:

```json
{
  "forms": [
    { "formId": 1, "title": "Survey Form A", "names": ["Aurora", "Beacon", "Catalyst", "Delta"] }
  ],
  "questions": [
    { "id": "q1", "text": "Which name is the most memorable?" }
  ]
}
```

Every form needs exactly 4 names. The `questions` list needs exactly 5
entries; when it is left out, the built-in questions are used.

## Command line

```bash
export DATABASE_URL=sqlite://survey.db
brandpoll init
brandpoll next
brandpoll submit --form 1 --session 3f2a --answer Aurora --answer Beacon \
  --answer Catalyst --answer Delta --answer Aurora --top-choice "Aurora, short and bright"
brandpoll stats
brandpoll rankings
```

`DATABASE_URL` is mandatory. `STORAGE_TIMEOUT_MS` bounds how long a command
waits for a locked database (5000 by default). `RUST_LOG` controls logging;
`--verbose` switches the default to `debug`.

*/
