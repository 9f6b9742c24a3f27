//! Assigns regex capture values to route parameters, consulting param matchers.

use crate::routing::{Matchers, Params, RouteParam};

/// Turns the per-parameter capture values of a matched route into a params map.
///
/// Returns `None` when a matcher rejects a value that can't be re-attributed, meaning the
/// route does not apply to this path. Rest parameters that captured nothing map to `""`.
///
/// In the `[[a=m]]/.../[...rest]` case, an optional value rejected by its matcher is not
/// fatal: it is buffered and later folded into the rest parameter's value. Any value still
/// buffered once all parameters are visited fails the match.
pub fn exec(values: &[Option<&str>], params: &[RouteParam], matchers: &Matchers) -> Option<Params> {
    let mut result = Params::new();
    let values_needing_match = values.iter().filter(|value| value.is_some()).count();
    let mut buffered = 0;

    for (i, param) in params.iter().enumerate() {
        let mut value = values.get(i - buffered).copied().flatten().map(str::to_string);

        if param.chained && param.rest && buffered > 0 {
            let end = (i + 1).min(values.len());
            let skipped: Vec<&str> = values[i - buffered..end]
                .iter()
                .flatten()
                .copied()
                .filter(|s| !s.is_empty())
                .collect();
            value = Some(skipped.join("/"));
            buffered = 0;
        }

        let Some(value) = value else {
            if param.rest {
                result.insert(param.name.clone(), String::new());
            }
            continue;
        };

        if accepts(param, &value, matchers) {
            result.insert(param.name.clone(), value);

            let next_param = params.get(i + 1);
            let next_value = values.get(i + 1).copied().flatten().filter(|v| !v.is_empty());

            // a concrete value for the next optional slot means nothing is left to re-attribute
            if let Some(next) = next_param
                && !next.rest
                && next.optional
                && next_value.is_some()
                && param.chained
            {
                buffered = 0;
            }

            // out of params and values, and every non-empty value has been accounted for
            if next_param.is_none() && next_value.is_none() && result.len() == values_needing_match {
                buffered = 0;
            }
            continue;
        }

        if param.optional && param.chained {
            buffered += 1;
            continue;
        }

        return None;
    }

    if buffered > 0 {
        return None;
    }
    Some(result)
}

fn accepts(param: &RouteParam, value: &str, matchers: &Matchers) -> bool {
    match &param.matcher {
        None => true,
        Some(name) => match matchers.get(name) {
            Some(matcher) => matcher(value),
            None => {
                tracing::warn!("No matcher named '{}' registered for param '{}'", name, param.name);
                false
            }
        },
    }
}
