//! The two Lua scripts that realize §4.1's atomic operations on Redis.
//! Both run under `EVAL`/`EVALSHA`; Redis's single-threaded command
//! execution is the serializer (§9 "no global lock").
//!
//! Key layout per api_key, six Redis keys:
//!   KEYS[1] in_zset    — ZSET member=event_id score=timestamp
//!   KEYS[2] in_costs   — HASH field=event_id value=cost
//!   KEYS[3] out_zset
//!   KEYS[4] out_costs
//!   KEYS[5] req_zset   — ZSET member=event_id score=timestamp (cost always 1)
//!
//! `req` has no cost hash: every request event costs exactly 1, so ZCARD
//! after eviction is the sum directly.

pub const ADMIT_SCRIPT: &str = r#"
local in_zset   = KEYS[1]
local in_costs  = KEYS[2]
local out_zset  = KEYS[3]
local out_costs = KEYS[4]
local req_zset  = KEYS[5]

local limit_in  = tonumber(ARGV[1])
local cost_in   = tonumber(ARGV[2])
local limit_out = tonumber(ARGV[3])
local cost_out  = tonumber(ARGV[4])
local limit_req = tonumber(ARGV[5])
local now       = tonumber(ARGV[6])
local window    = tonumber(ARGV[7])
local event_id  = ARGV[8]

local cutoff = now - window

local function evict_and_sum(zset, costs)
    local expired = redis.call('ZRANGEBYSCORE', zset, '-inf', '(' .. tostring(cutoff))
    for _, member in ipairs(expired) do
        if costs then
            redis.call('HDEL', costs, member)
        end
    end
    if #expired > 0 then
        redis.call('ZREMRANGEBYSCORE', zset, '-inf', '(' .. tostring(cutoff))
    end

    local sum = 0
    if costs then
        local remaining = redis.call('ZRANGE', zset, 0, -1)
        if #remaining > 0 then
            local values = redis.call('HMGET', costs, unpack(remaining))
            for _, v in ipairs(values) do
                sum = sum + (tonumber(v) or 0)
            end
        end
    else
        sum = redis.call('ZCARD', zset)
    end
    return sum
end

local function retry_at_ms(zset)
    local oldest = redis.call('ZRANGE', zset, 0, 0, 'WITHSCORES')
    if #oldest < 2 then
        -- No surviving event to anchor on (the request alone exceeds the
        -- limit): the earliest possible relief is a full window away.
        return math.floor((now + window) * 1000)
    end
    local oldest_score = tonumber(oldest[2])
    return math.floor((oldest_score + window) * 1000)
end

local sum_in = evict_and_sum(in_zset, in_costs)
if sum_in + cost_in > limit_in then
    return {0, 'INPUT_TPM', retry_at_ms(in_zset)}
end

local sum_out = evict_and_sum(out_zset, out_costs)
if sum_out + cost_out > limit_out then
    return {0, 'OUTPUT_TPM', retry_at_ms(out_zset)}
end

local sum_req = evict_and_sum(req_zset, nil)
if sum_req + 1 > limit_req then
    return {0, 'RPM', retry_at_ms(req_zset)}
end

redis.call('ZADD', in_zset, now, event_id)
redis.call('HSET', in_costs, event_id, cost_in)
redis.call('ZADD', out_zset, now, event_id)
redis.call('HSET', out_costs, event_id, cost_out)
redis.call('ZADD', req_zset, now, event_id)

local ttl = window + 5
redis.call('EXPIRE', in_zset, ttl)
redis.call('EXPIRE', in_costs, ttl)
redis.call('EXPIRE', out_zset, ttl)
redis.call('EXPIRE', out_costs, ttl)
redis.call('EXPIRE', req_zset, ttl)

return {1}
"#;

/// KEYS[1] out_zset, KEYS[2] out_costs. ARGV[1] event_id, ARGV[2] new_cost.
/// Never re-checks the limit — an over-limit reconcile is transient and
/// self-heals when the event expires.
pub const RECONCILE_SCRIPT: &str = r#"
local out_zset  = KEYS[1]
local out_costs = KEYS[2]
local event_id  = ARGV[1]
local new_cost  = ARGV[2]

local score = redis.call('ZSCORE', out_zset, event_id)
if not score then
    return 0
end

redis.call('HSET', out_costs, event_id, new_cost)
return 1
"#;
