// GitHub CLI pull request listing

pub const PR_FIELDS: &str = "number,title,author,headRefName,createdAt,isDraft,reviewDecision,mergeable,additions,deletions,changedFiles,url,statusCheckRollup";

pub const PR_LIMIT: u32 = 50;
