//! Approximate matching of user-typed file names against directory entries.

fn extension(name: &str) -> Option<&str> {
    let stem_end = name.rfind('.')?;
    if stem_end == 0 {
        return None;
    }
    Some(&name[stem_end + 1..])
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}

fn is_subsequence(needle: &str, hay: &str) -> bool {
    let mut wanted = needle.chars();
    let mut current = wanted.next();
    for c in hay.chars() {
        if Some(c) == current {
            current = wanted.next();
        }
    }
    current.is_none()
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut cur = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b_chars.len()]
}

/// Higher is better; zero means no match.
pub fn score(query: &str, candidate: &str) -> i32 {
    if query.is_empty() {
        return 0;
    }
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();
    let len_penalty = candidate.len().min(40) as i32;

    let mut score = if c == q {
        1000
    } else if stem(&c) == q {
        // "package" -> "package.json"
        400
    } else if c.starts_with(&q) {
        300 - len_penalty
    } else if c.contains(&q) {
        200 - len_penalty
    } else {
        let dist = levenshtein(&q, stem(&c)).min(levenshtein(&q, &c));
        if dist <= 2 && q.len() > 2 {
            150 - (dist as i32) * 20 - len_penalty
        } else if q.len() > 2 && is_subsequence(&q, &c) {
            100 - len_penalty
        } else {
            return 0;
        }
    };

    if let (Some(qe), Some(ce)) = (extension(&q), extension(&c)) {
        if qe == ce {
            score += 25;
        }
    }
    score.max(1)
}

/// Best directory entry for `query`, if any entry is a plausible match.
pub fn best_match<'a>(query: &str, entries: &'a [String]) -> Option<&'a str> {
    entries
        .iter()
        .map(|e| (score(query, e), e))
        .filter(|(s, _)| *s > 0)
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.len().cmp(&a.1.len())))
        .map(|(_, e)| e.as_str())
}

/// Programs that only read their operand; nothing else is ever rewritten.
const READ_ONLY: &[&str] = &["cat", "less", "more", "head", "tail", "wc", "file", "stat"];

/// Repair the single file operand of a read-only command when that operand
/// doesn't exist in `entries`. Anything with a redirect, pipe or several
/// operands comes back unchanged.
pub fn repair_command(command: &str, entries: &[String]) -> String {
    let mut words = command.split_whitespace();
    let program = words.next().unwrap_or_default();
    if entries.is_empty() || !READ_ONLY.contains(&program) {
        return command.to_string();
    }
    let rest: Vec<&str> = words.collect();
    if rest.iter().any(|w| w.contains(['>', '<', '|', '&', ';', '`', '$'])) {
        return command.to_string();
    }
    let operands: Vec<&str> = rest.iter().copied().filter(|w| !w.starts_with('-')).collect();
    let [operand] = operands.as_slice() else {
        return command.to_string();
    };
    let plain = !operand.contains(['/', '*', '?', '"', '\'']);
    if !plain || entries.iter().any(|e| e == operand) {
        return command.to_string();
    }
    match best_match(operand, entries) {
        Some(found) => {
            let mut out = vec![program];
            out.extend(rest.iter().map(|w| if w == operand { found } else { *w }));
            out.join(" ")
        }
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<String> {
        ["README.md", "package.json", "tsconfig.json", "smiley.txt", "src"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_best_match() {
        let e = entries();
        assert_eq!(best_match("smily", &e), Some("smiley.txt"));
        assert_eq!(best_match("readme", &e), Some("README.md"));
        assert_eq!(best_match("package", &e), Some("package.json"));
        assert_eq!(best_match("tsconf", &e), Some("tsconfig.json"));
        assert_eq!(best_match("zzz", &e), None);
    }

    #[test]
    fn test_repair_command() {
        let e = entries();
        assert_eq!(repair_command("cat smily", &e), "cat smiley.txt");
        assert_eq!(repair_command("tail -f readmee", &e), "tail -f README.md");
        assert_eq!(repair_command("rm -i readmee", &e), "rm -i readmee");
        assert_eq!(repair_command("ls -la", &e), "ls -la");
        assert_eq!(repair_command("cat /etc/motd", &e), "cat /etc/motd");
        assert_eq!(repair_command("mkdir projects", &e), "mkdir projects");
    }

    #[test]
    fn test_repair_leaves_writes_alone() {
        let e: Vec<String> = ["names.txt", "sorted_old.txt", "old.txt", "news.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for cmd in [
            "mv old.txt new.txt",
            "cp old.txt new.txt",
            "ln -s old.txt new.txt",
            "rm nams.txt",
            "sort names.txt > sorted.txt",
            "cat names.txt >> sorted.txt",
            "cat nams.txt | sort",
            "cat nams.txt old.txt",
        ] {
            assert_eq!(repair_command(cmd, &e), cmd);
        }
        assert_eq!(repair_command("cat nams.txt", &e), "cat names.txt");
    }
}
